//! # Protocol Configuration & Constants
//!
//! Every magic number in credtree lives here. If you're hardcoding a timeout
//! or a gas limit somewhere else, move it here and feel better about yourself.
//!
//! Runtime knobs (`TransactorConfig`, the simulated ledger's config) take
//! their `Default` values from these constants, so there is exactly one place
//! to look when a benchmark behaves differently than expected.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Ledger Parameters
// ---------------------------------------------------------------------------

/// Chain id used by the development ledger. Signed calls carrying any other
/// id are rejected before they reach the pending pool.
pub const DEFAULT_CHAIN_ID: u64 = 1337;

/// Gas limit attached to every transaction context. Matches the block gas
/// limit of the development chains the benchmark was calibrated against.
pub const DEFAULT_GAS_LIMIT: u64 = 6_721_975;

/// Fee price the simulated ledger suggests when nothing else is going on.
pub const DEFAULT_FEE_PRICE: u64 = 20_000_000_000;

// ---------------------------------------------------------------------------
// Transaction Lifecycle
// ---------------------------------------------------------------------------

/// How often a pending transaction's receipt is polled.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long `wait_for_confirmation` polls before giving up. A timed-out
/// transaction is indeterminate: it may still be mined later.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Maximum number of inner nodes a tree verification nests through, in
/// either mode. Real institutional hierarchies are three or four levels
/// deep; anything past this bound is treated as a witness cycle. Width is
/// not bounded.
pub const MAX_TREE_DEPTH: usize = 16;

// ---------------------------------------------------------------------------
// Issuance Driver
// ---------------------------------------------------------------------------

/// Default number of issuance workflows allowed in flight at once.
pub const DEFAULT_WORKER_LIMIT: usize = 32;

/// Byte length of an account address (last 20 bytes of a Keccak-256 hash).
pub const ADDRESS_LENGTH: usize = 20;

/// Byte length of a credential digest.
pub const DIGEST_LENGTH: usize = 32;
