//! The signup registry shared by every poll, and the processing lock.

use maci_crypto::{Field, IncrementalQuinTree, Keypair, PublicKey};
use rand_core::{CryptoRng, RngCore};
use slog::{debug, Logger};

use crate::error::PollError;
use crate::logging::LoggerExtensions;
use crate::parameters::{BatchSizes, MaxValues, TreeDepths};
use crate::poll::processing::ProcessMessagesCircuitInputs;
use crate::poll::subsidy::SubsidyCircuitInputs;
use crate::poll::tally::TallyVotesCircuitInputs;
use crate::poll::Poll;
use crate::state_leaf::StateLeaf;

/// Index of a poll in the registry.
pub type PollId = usize;

/// Process-wide mutual exclusion for message processing: at most one poll of
/// a `MaciState` may be mid-processing at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessingLock {
    holder: Option<PollId>,
}

impl ProcessingLock {
    /// Take (or re-enter) the lock for `poll_id`.
    ///
    /// # Error
    /// Fails when another poll holds the lock.
    pub fn acquire(&mut self, poll_id: PollId) -> Result<(), PollError> {
        match self.holder {
            Some(current) if current != poll_id => {
                Err(PollError::PollAlreadyBeingProcessed { requested: poll_id, current })
            }
            _ => {
                self.holder = Some(poll_id);
                Ok(())
            }
        }
    }

    /// Release the lock.
    ///
    /// # Panics
    /// Panics when the caller does not hold it: releasing someone else's
    /// lock is a programmer error.
    pub fn release(&mut self, poll_id: PollId) {
        assert_eq!(
            self.holder,
            Some(poll_id),
            "poll {poll_id} released a processing lock it does not hold"
        );
        self.holder = None;
    }

    pub fn holder(&self) -> Option<PollId> {
        self.holder
    }
}

/// The slice of `MaciState` a poll needs while processing messages: the
/// signup registry read-only, the lock mutable. Polls never own a reference
/// back to the state; the handle is passed explicitly per call.
pub struct MaciStateView<'a> {
    pub state_leaves: &'a [StateLeaf],
    pub state_tree: &'a IncrementalQuinTree,
    pub num_sign_ups: usize,
    pub lock: &'a mut ProcessingLock,
}

/// Signup registry plus the polls deployed against it.
#[derive(Clone)]
pub struct MaciState {
    pub state_tree_depth: usize,
    pub state_leaves: Vec<StateLeaf>,
    pub state_tree: IncrementalQuinTree,
    pub num_sign_ups: usize,
    pub polls: Vec<Poll>,
    pub lock: ProcessingLock,
    logger: Logger,
}

impl MaciState {
    /// Create an empty registry. Index 0 of the state tree is the blank
    /// sentinel leaf, so real signups start at index 1.
    pub fn new(state_tree_depth: usize, logger: &Logger) -> Self {
        let blank = StateLeaf::blank();
        let mut state_tree = IncrementalQuinTree::new(state_tree_depth, blank.hash());
        state_tree.insert(blank.hash());
        Self {
            state_tree_depth,
            state_leaves: vec![blank],
            state_tree,
            num_sign_ups: 0,
            polls: Vec::new(),
            lock: ProcessingLock::default(),
            logger: logger.new_with_name("maci_state"),
        }
    }

    /// Register a voter and return their state index.
    ///
    /// # Error
    /// Fails when the state tree is full.
    pub fn sign_up(
        &mut self,
        pub_key: PublicKey,
        voice_credit_balance: Field,
        timestamp: Field,
    ) -> Result<usize, PollError> {
        if self.state_tree.next_index() >= self.state_tree.capacity() {
            return Err(PollError::StateTreeFull);
        }
        let leaf = StateLeaf::new(pub_key, voice_credit_balance, timestamp);
        self.state_tree.insert(leaf.hash());
        self.state_leaves.push(leaf);
        self.num_sign_ups += 1;
        let index = self.state_leaves.len() - 1;
        debug!(self.logger, "voter signed up"; "state_index" => index);
        Ok(index)
    }

    /// Deploy a poll against the current registry and return its id.
    pub fn deploy_poll(
        &mut self,
        poll_end_timestamp: Field,
        max_values: MaxValues,
        tree_depths: TreeDepths,
        batch_sizes: BatchSizes,
        coordinator_keypair: Keypair,
    ) -> PollId {
        assert_eq!(
            tree_depths.state_tree_depth, self.state_tree_depth,
            "poll state tree depth must match the registry"
        );
        let poll_id = self.polls.len();
        self.polls.push(Poll::new(
            poll_id,
            poll_end_timestamp,
            coordinator_keypair,
            tree_depths,
            batch_sizes,
            max_values,
            &self.logger,
        ));
        debug!(self.logger, "poll deployed"; "poll_id" => poll_id);
        poll_id
    }

    /// Process the next message batch of the given poll.
    pub fn process_messages<R: RngCore + CryptoRng>(
        &mut self,
        poll_id: PollId,
        rng: &mut R,
    ) -> Result<ProcessMessagesCircuitInputs, PollError> {
        let Self { state_leaves, state_tree, num_sign_ups, polls, lock, .. } = self;
        let poll = polls.get_mut(poll_id).ok_or(PollError::PollNotFound(poll_id))?;
        let view = MaciStateView {
            state_leaves: state_leaves.as_slice(),
            state_tree: &*state_tree,
            num_sign_ups: *num_sign_ups,
            lock,
        };
        poll.process_messages(view, rng)
    }

    /// Tally the next ballot batch of the given poll.
    pub fn tally_votes<R: RngCore + CryptoRng>(
        &mut self,
        poll_id: PollId,
        rng: &mut R,
    ) -> Result<TallyVotesCircuitInputs, PollError> {
        self.polls
            .get_mut(poll_id)
            .ok_or(PollError::PollNotFound(poll_id))?
            .tally_votes(rng)
    }

    /// Advance the subsidy grid of the given poll by one block.
    pub fn subsidy_per_batch<R: RngCore + CryptoRng>(
        &mut self,
        poll_id: PollId,
        rng: &mut R,
    ) -> Result<SubsidyCircuitInputs, PollError> {
        self.polls
            .get_mut(poll_id)
            .ok_or(PollError::PollNotFound(poll_id))?
            .subsidy_per_batch(rng)
    }
}
