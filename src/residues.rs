//! Per-residue lookup tables.

/// Wimley–White whole-residue hydrophobicity scales (kcal/mol).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrophobicityScale {
    /// Water to POPC interface (DGwif)
    WaterInterface,
    /// Water to octanol (DGwoct)
    WaterOctanol,
    /// Octanol to interface (Oct-IF)
    OctanolInterface,
}

impl HydrophobicityScale {
    fn column(self) -> usize {
        match self {
            HydrophobicityScale::WaterInterface => 0,
            HydrophobicityScale::WaterOctanol => 1,
            HydrophobicityScale::OctanolInterface => 2,
        }
    }
}

/// `[DGwif, DGwoct, Oct-IF]` for a residue name.
/// ASH and GLH are the protonated forms of ASP and GLU.
fn wimley_white(comp_id: &str) -> Option<[f64; 3]> {
    match comp_id {
        "ALA" => Some([0.17, 0.50, 0.33]),
        "ARG" => Some([0.81, 1.81, 1.00]),
        "ASN" => Some([0.42, 0.85, 0.43]),
        "ASP" => Some([1.23, 3.64, 2.41]),
        "ASH" => Some([-0.07, 0.43, 0.50]),
        "CYS" => Some([-0.24, -0.02, 0.22]),
        "GLN" => Some([0.58, 0.77, 0.19]),
        "GLU" => Some([2.02, 3.63, 1.61]),
        "GLH" => Some([-0.01, 0.11, 0.12]),
        "GLY" => Some([0.01, 1.15, 1.14]),
        "HIS" => Some([0.17, 0.11, -0.06]),
        "ILE" => Some([-0.31, -1.12, -0.81]),
        "LEU" => Some([-0.56, -1.25, -0.69]),
        "LYS" => Some([0.99, 2.80, 1.81]),
        "MET" => Some([-0.23, -0.67, -0.44]),
        "PHE" => Some([-1.13, -1.71, -0.58]),
        "PRO" => Some([0.45, 0.14, -0.31]),
        "SER" => Some([0.13, 0.46, 0.33]),
        "THR" => Some([0.14, 0.25, 0.11]),
        "TRP" => Some([-1.85, -2.09, -0.24]),
        "TYR" => Some([-0.94, -0.71, 0.23]),
        "VAL" => Some([0.07, -0.46, -0.53]),
        _ => None,
    }
}

/// Hydrophobicity of a residue on the given scale, `None` for anything that is
/// not one of the standard amino acids (ligands, water, nucleotides).
///
/// # Example
///
/// ```
/// use molsurf::residues::{residue_hydrophobicity, HydrophobicityScale};
///
/// assert_eq!(residue_hydrophobicity("TRP", HydrophobicityScale::WaterInterface), Some(-1.85));
/// assert_eq!(residue_hydrophobicity("HOH", HydrophobicityScale::WaterInterface), None);
/// ```
pub fn residue_hydrophobicity(comp_id: &str, scale: HydrophobicityScale) -> Option<f64> {
    wimley_white(comp_id).map(|values| values[scale.column()])
}

/// Water residue names.
pub fn is_water(comp_id: &str) -> bool {
    matches!(comp_id, "HOH" | "WAT" | "DOD" | "H2O")
}
