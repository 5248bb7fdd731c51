pub mod builders;

pub use builders::{PortalBuilder, UserBuilder};
