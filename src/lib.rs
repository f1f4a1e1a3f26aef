// powledger - Single-node proof-of-work ledger
//
// Modules, leaves first:
// - identity: Ed25519 keys, signatures and account addresses
// - transaction: transfer payloads, their signed and pooled forms, the wire codec
// - chain: headers, blocks and the merkle commitment
// - verification: hashing, proof of work, chain walk and transaction admission
// - storage: namespaced blob persistence
// - ledger: the chain state machine
// - sync: peers, peer calls and the locked node wrapper

pub mod chain;
pub mod identity;
pub mod ledger;
pub mod storage;
pub mod sync;
pub mod transaction;
pub mod verification;
