pub mod k_centers;
pub mod labels;
pub mod merge_assignments;
