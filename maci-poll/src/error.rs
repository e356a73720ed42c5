//! Crate specific errors

use crate::maci_state::PollId;

/// Rejection kinds for a single vote command, in the order the checks run.
/// The first check to fail decides the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProcessMessageError {
    /// The targeted state leaf does not exist (or is the blank sentinel)
    #[error("the state leaf index is out of range")]
    InvalidStateLeafIndex,

    /// The command signature does not verify against the state leaf key
    #[error("the command signature is invalid")]
    InvalidSignature,

    /// The command nonce does not follow the ballot nonce
    #[error("the command nonce is invalid")]
    InvalidNonce,

    /// The vote option index exceeds the poll's option count
    #[error("the vote option index is out of range")]
    InvalidVoteOptionIndex,

    /// The refund-and-repay balance would go negative
    #[error("the voice credit balance cannot cover the new vote weight")]
    InsufficientVoiceCredits,

    /// The message could not be decrypted to a well-formed command
    #[error("the message could not be decrypted")]
    FailedDecryption,
}

/// Coordinator-facing failures of the poll lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    /// Another poll holds the processing lock
    #[error("poll {requested} cannot be processed while poll {current} holds the processing lock")]
    PollAlreadyBeingProcessed { requested: PollId, current: PollId },

    /// Message processing has already covered every batch
    #[error("all message batches have been processed")]
    MessagesAlreadyProcessed,

    /// The tally has already covered every ballot
    #[error("all ballots have been tallied")]
    BallotsAlreadyTallied,

    /// The subsidy grid has been fully walked
    #[error("the subsidy calculation is complete")]
    SubsidyComplete,

    /// No poll is registered under this id
    #[error("no poll with id {0}")]
    PollNotFound(PollId),

    /// The signup tree cannot take another leaf
    #[error("the state tree is full")]
    StateTreeFull,
}
