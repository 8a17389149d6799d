mod multisig;
mod proposal;
mod transfer;
mod user;
mod vault;

pub use multisig::*;
pub use proposal::*;
pub use transfer::*;
pub use user::*;
pub use vault::*;
