pub mod alert;
pub mod options;
pub mod risk;

pub use alert::*;
pub use options::*;
pub use risk::*;
