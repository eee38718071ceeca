pub mod tfjob;

pub use tfjob::TFJobController;
