//! Off-chain MACI poll state machine.
//!
//! The coordinator-side mirror of an on-chain voting round: encrypted vote
//! commands are ingested into a message tree, deterministically resolved
//! against per-voter ballots with quadratic voice-credit accounting, and
//! replayed in fixed-size batches whose transcripts feed the
//! `ProcessMessages`, `TallyVotes` and `Subsidy` circuits. Given the same
//! inputs and salts, two runs produce bit-identical Merkle roots and circuit
//! inputs.
//!
//! ```rust
//! use maci_crypto::{Field, Keypair};
//! use maci_poll::{
//!     command::VoteCommand, logging::discard_logger, maci_state::MaciState,
//!     parameters::{BatchSizes, MaxValues, TreeDepths},
//! };
//! use rand_chacha::ChaCha20Rng;
//! use rand_core::SeedableRng;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut rng = ChaCha20Rng::from_seed([0u8; 32]);
//! let logger = discard_logger();
//!
//! // Signup phase: one voter with 100 voice credits.
//! let mut maci = MaciState::new(10, &logger);
//! let coordinator = Keypair::rand(&mut rng);
//! let voter = Keypair::rand(&mut rng);
//! let state_index = maci.sign_up(voter.public_key, Field::from(100u64), Field::from(0u64))?;
//!
//! let poll_id = maci.deploy_poll(
//!     Field::from(1_700_000_000u64),
//!     MaxValues { max_messages: 25, max_vote_options: 25 },
//!     TreeDepths { state_tree_depth: 10, message_tree_depth: 2, vote_option_tree_depth: 2 },
//!     BatchSizes { message_batch_size: 5, tally_batch_size: 5, subsidy_batch_size: 5 },
//!     coordinator,
//! );
//!
//! // Voting phase: weight 5 on option 3, encrypted to the coordinator.
//! let command = VoteCommand::new(
//!     Field::from(state_index as u64),
//!     voter.public_key,
//!     Field::from(3u64),
//!     Field::from(5u64),
//!     Field::from(1u64),
//!     Field::from(poll_id as u64),
//!     Field::from(42u64),
//! );
//! let signature = command.sign(&voter.private_key);
//! let ephemeral = Keypair::rand(&mut rng);
//! let shared_key = ephemeral.gen_ecdh_shared_key(&coordinator.public_key)?;
//! let message = command.encrypt(&signature, shared_key);
//! maci.polls[poll_id].publish_message(message, ephemeral.public_key);
//!
//! // Processing and tallying produce the circuit inputs.
//! while maci.polls[poll_id].has_unprocessed_messages() {
//!     maci.process_messages(poll_id, &mut rng)?;
//! }
//! while maci.polls[poll_id].has_untallied_ballots() {
//!     maci.tally_votes(poll_id, &mut rng)?;
//! }
//! assert_eq!(maci.polls[poll_id].results[3], Field::from(5u64));
//! # Ok(())
//! # }
//! ```

pub mod ballot;
pub mod command;
pub mod error;
pub mod logging;
pub mod maci_state;
pub mod message;
pub mod parameters;
pub mod poll;
pub mod state_leaf;

pub use ballot::Ballot;
pub use command::{Command, TopupCommand, VoteCommand};
pub use error::{PollError, ProcessMessageError};
pub use maci_state::{MaciState, MaciStateView, PollId, ProcessingLock};
pub use message::{Message, MESSAGE_DATA_LENGTH};
pub use parameters::{BatchSizes, MaxValues, TreeDepths};
pub use poll::processing::ProcessMessagesCircuitInputs;
pub use poll::subsidy::SubsidyCircuitInputs;
pub use poll::tally::TallyVotesCircuitInputs;
pub use poll::{Poll, PollJson};
pub use state_leaf::StateLeaf;
