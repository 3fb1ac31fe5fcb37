pub mod app;
pub mod db;
pub mod fleet;
pub mod legacy;
pub mod volume;

pub use app::*;
pub use db::*;
pub use fleet::*;
pub use legacy::*;
pub use volume::*;
