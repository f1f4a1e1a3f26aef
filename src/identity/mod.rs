// Identity module - Ed25519 signing capability and account addresses

mod address;
mod keypair;
mod signer;

pub use address::*;
pub use keypair::*;
pub use signer::*;
