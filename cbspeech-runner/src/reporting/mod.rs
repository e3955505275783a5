//! Report artifacts: CSV tables, breakpoint JSON and the run inventory.

pub mod artifacts;

pub use artifacts::{
    read_breakpoints, read_inventory, read_matrix, read_table, ArtifactManager, ArtifactPaths,
    LabelledMatrix, RunInventory, INVENTORY_FILE,
};
