pub mod error;
pub mod ids;
pub mod key;
pub mod settings;
pub mod timestamp;

pub use error::*;
pub use ids::*;
pub use key::*;
pub use settings::*;
pub use timestamp::*;
