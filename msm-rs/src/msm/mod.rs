pub mod eigen;
pub mod implied_timescales;
pub mod model;
pub mod state_matrix;
pub mod transition_matrix;
