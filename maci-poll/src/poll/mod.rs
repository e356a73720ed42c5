//! The poll state machine.
//!
//! A `Poll` accepts encrypted messages while voting is open, then replays
//! them deterministically: batch-by-batch message processing against a
//! snapshot of the signup state, followed by tallying and (optionally) the
//! pairwise subsidy calculation. Each phase emits the inputs of the circuit
//! that proves it.

pub mod processing;
pub mod subsidy;
pub mod tally;

use std::collections::HashMap;

use ark_ff::Zero;
use maci_crypto::codec::{field_from_dec_str, field_to_dec_string};
use maci_crypto::merkle_tree::{MerklePath, TREE_ARITY};
use maci_crypto::{
    CryptoError, Field, IncrementalQuinTree, Keypair, PublicKey, NOTHING_UP_MY_SLEEVE,
};
use serde::{Deserialize, Serialize};
use slog::{debug, info, Logger};

use crate::ballot::Ballot;
use crate::command::{Command, TopupCommand, VoteCommand};
use crate::logging::LoggerExtensions;
use crate::maci_state::PollId;
use crate::message::{Message, MESSAGE_DATA_LENGTH, MESSAGE_TYPE_TOPUP, MESSAGE_TYPE_VOTE};
use crate::parameters::{BatchSizes, MaxValues, TreeDepths};
use crate::state_leaf::StateLeaf;

/// A deployed poll: message log, state snapshot and phase progress.
#[derive(Clone)]
pub struct Poll {
    pub poll_id: PollId,
    pub poll_end_timestamp: Field,
    pub coordinator_keypair: Keypair,
    pub tree_depths: TreeDepths,
    pub batch_sizes: BatchSizes,
    pub max_values: MaxValues,

    // Message ingest.
    pub messages: Vec<Message>,
    pub commands: Vec<Command>,
    pub enc_pub_keys: Vec<PublicKey>,
    pub message_tree: IncrementalQuinTree,

    // State snapshot, taken on the first processing call.
    pub state_leaves: Vec<StateLeaf>,
    pub state_tree: Option<IncrementalQuinTree>,
    pub ballots: Vec<Ballot>,
    pub ballot_tree: Option<IncrementalQuinTree>,
    pub(crate) num_sign_ups: usize,
    pub(crate) state_copied: bool,

    // Message processing progress.
    pub num_batches_processed: usize,
    pub current_message_batch_index: Option<usize>,
    pub(crate) sb_salts: HashMap<usize, Field>,

    // Tally progress.
    pub results: Vec<Field>,
    pub per_vo_spent_voice_credits: Vec<Field>,
    pub total_spent_voice_credits: Field,
    pub num_batches_tallied: usize,
    pub(crate) results_root_salts: HashMap<usize, Field>,
    pub(crate) per_vo_spent_voice_credits_root_salts: HashMap<usize, Field>,
    pub(crate) spent_voice_credit_subtotal_salts: HashMap<usize, Field>,

    // Subsidy progress.
    pub subsidy: Vec<Field>,
    pub(crate) subsidy_salts: HashMap<String, Field>,
    pub(crate) row_batch_index: usize,
    pub(crate) col_batch_index: usize,

    pub(crate) logger: Logger,
}

impl Poll {
    /// # Panics
    /// Panics when the message batch size is not a power of five (a message
    /// batch must be an aligned message-tree subtree) or when the caps do
    /// not fit the configured tree depths.
    pub fn new(
        poll_id: PollId,
        poll_end_timestamp: Field,
        coordinator_keypair: Keypair,
        tree_depths: TreeDepths,
        batch_sizes: BatchSizes,
        max_values: MaxValues,
        logger: &Logger,
    ) -> Self {
        let mut width = 1;
        while width < batch_sizes.message_batch_size {
            width *= TREE_ARITY;
        }
        assert_eq!(
            width, batch_sizes.message_batch_size,
            "message batch size must be a power of {TREE_ARITY}"
        );
        let option_capacity = TREE_ARITY.pow(tree_depths.vote_option_tree_depth as u32);
        assert!(
            max_values.max_vote_options <= option_capacity,
            "max vote options exceed the vote option tree"
        );
        assert!(
            max_values.max_messages <= TREE_ARITY.pow(tree_depths.message_tree_depth as u32),
            "max messages exceed the message tree"
        );

        Self {
            poll_id,
            poll_end_timestamp,
            coordinator_keypair,
            tree_depths,
            batch_sizes,
            max_values,
            messages: Vec::new(),
            commands: Vec::new(),
            enc_pub_keys: Vec::new(),
            message_tree: IncrementalQuinTree::new(
                tree_depths.message_tree_depth,
                NOTHING_UP_MY_SLEEVE,
            ),
            state_leaves: Vec::new(),
            state_tree: None,
            ballots: Vec::new(),
            ballot_tree: None,
            num_sign_ups: 0,
            state_copied: false,
            num_batches_processed: 0,
            current_message_batch_index: None,
            sb_salts: HashMap::new(),
            results: vec![Field::zero(); option_capacity],
            per_vo_spent_voice_credits: vec![Field::zero(); option_capacity],
            total_spent_voice_credits: Field::zero(),
            num_batches_tallied: 0,
            results_root_salts: HashMap::new(),
            per_vo_spent_voice_credits_root_salts: HashMap::new(),
            spent_voice_credit_subtotal_salts: HashMap::new(),
            subsidy: vec![Field::zero(); option_capacity],
            subsidy_salts: HashMap::new(),
            row_batch_index: 0,
            col_batch_index: 0,
            logger: logger.new_with_name("poll"),
        }
    }

    /// Ingest an encrypted vote / key-change message.
    ///
    /// The command is decrypted tentatively: any failure (off-curve
    /// ephemeral key, bad authentication tag, overflowing packed word) is
    /// recorded as the zero command so message and command indices stay
    /// aligned. Rejection happens later, during processing.
    ///
    /// # Panics
    /// Panics on a non-vote message type or when the message cap is
    /// reached; both are caller bugs, not voter-controlled input.
    pub fn publish_message(&mut self, message: Message, enc_pub_key: PublicKey) {
        assert_eq!(
            message.msg_type,
            Field::from(MESSAGE_TYPE_VOTE),
            "publish_message expects a vote-type message"
        );
        assert!(
            self.messages.len() < self.max_values.max_messages,
            "message cap reached"
        );
        self.message_tree.insert(message.hash(&enc_pub_key));
        self.messages.push(message);
        self.enc_pub_keys.push(enc_pub_key);

        let command = self
            .coordinator_keypair
            .gen_ecdh_shared_key(&enc_pub_key)
            .and_then(|shared| VoteCommand::decrypt(&message, shared))
            .map(|(command, _)| command)
            .unwrap_or_else(|_| VoteCommand::zero());
        self.commands.push(Command::Vote(command));
        debug!(self.logger, "message published"; "index" => self.messages.len() - 1);
    }

    /// Ingest a voice-credit topup. The message-tree slot is keyed with the
    /// fixed pad key, since topups carry no ephemeral key.
    ///
    /// # Panics
    /// Panics on a non-topup message type or when the message cap is
    /// reached.
    pub fn topup_message(&mut self, message: Message) {
        assert_eq!(
            message.msg_type,
            Field::from(MESSAGE_TYPE_TOPUP),
            "topup_message expects a topup-type message"
        );
        assert!(
            self.messages.len() < self.max_values.max_messages,
            "message cap reached"
        );
        let pad_key = PublicKey::pad_key();
        self.message_tree.insert(message.hash(&pad_key));
        self.messages.push(message);
        self.enc_pub_keys.push(pad_key);
        self.commands.push(Command::Topup(TopupCommand::new(
            message.data[0],
            message.data[1],
            Field::from(self.poll_id as u64),
        )));
        debug!(self.logger, "topup published"; "index" => self.messages.len() - 1);
    }

    /// Snapshot the signup registry into this poll and lay out one blank
    /// ballot per state leaf. Idempotent: later batches reuse the first
    /// snapshot, and poll-side mutations never leak back to the registry.
    pub fn copy_state_from_maci(
        &mut self,
        state_leaves: &[StateLeaf],
        state_tree: &IncrementalQuinTree,
        num_sign_ups: usize,
    ) {
        if self.state_copied {
            return;
        }
        self.state_leaves = state_leaves.to_vec();
        self.state_tree = Some(state_tree.clone());

        let empty_ballot = Ballot::blank(self.tree_depths.vote_option_tree_depth);
        let empty_ballot_hash = empty_ballot.hash();
        let mut ballot_tree =
            IncrementalQuinTree::new(self.tree_depths.state_tree_depth, empty_ballot_hash);
        while self.ballots.len() < self.state_leaves.len() {
            ballot_tree.insert(empty_ballot_hash);
            self.ballots.push(empty_ballot.clone());
        }
        self.ballot_tree = Some(ballot_tree);
        self.num_sign_ups = num_sign_ups;
        self.state_copied = true;
        info!(self.logger, "state snapshot taken";
            "poll_id" => self.poll_id, "state_leaves" => self.state_leaves.len());
    }

    /// Whether `process_messages` has batches left. A poll with at most one
    /// batch worth of messages (including none at all) claims exactly one.
    pub fn has_unprocessed_messages(&self) -> bool {
        let batch_size = self.batch_sizes.message_batch_size;
        let mut total_batches = if self.messages.len() <= batch_size {
            1
        } else {
            self.messages.len() / batch_size
        };
        if self.messages.len() > batch_size && self.messages.len() % batch_size != 0 {
            total_batches += 1;
        }
        self.num_batches_processed < total_batches
    }

    /// Row of the subsidy grid the next block is taken from.
    pub fn row_batch_index(&self) -> usize {
        self.row_batch_index
    }

    /// Column of the subsidy grid the next block is taken from.
    pub fn col_batch_index(&self) -> usize {
        self.col_batch_index
    }

    pub(crate) fn state_tree_ref(&self) -> &IncrementalQuinTree {
        self.state_tree.as_ref().expect("state snapshot taken")
    }

    pub(crate) fn state_tree_mut(&mut self) -> &mut IncrementalQuinTree {
        self.state_tree.as_mut().expect("state snapshot taken")
    }

    pub(crate) fn ballot_tree_ref(&self) -> &IncrementalQuinTree {
        self.ballot_tree.as_ref().expect("state snapshot taken")
    }

    pub(crate) fn ballot_tree_mut(&mut self) -> &mut IncrementalQuinTree {
        self.ballot_tree.as_mut().expect("state snapshot taken")
    }

    /// Serialize into the stable persisted layout.
    pub fn to_json(&self) -> PollJson {
        PollJson {
            poll_end_timestamp: field_to_dec_string(&self.poll_end_timestamp),
            tree_depths: self.tree_depths,
            batch_sizes: self.batch_sizes,
            max_values: self.max_values,
            messages: self.messages.iter().map(MessageJson::from).collect(),
            commands: self.commands.iter().map(CommandJson::from).collect(),
            ballots: self.ballots.iter().map(BallotJson::from).collect(),
            enc_pub_keys: self.enc_pub_keys.iter().map(pub_key_pair).collect(),
            current_message_batch_index: self.current_message_batch_index,
            state_leaves: self.state_leaves.iter().map(StateLeafJson::from).collect(),
            results: self.results.iter().map(field_to_dec_string).collect(),
            num_batches_processed: self.num_batches_processed,
        }
    }

    /// Rebuild a poll from the persisted layout.
    ///
    /// The message tree is re-derived by re-inserting every message hash.
    /// The state and ballot trees stay unset until [`Poll::restore_state`]
    /// runs against the owning registry. The coordinator keypair is not part
    /// of the layout, so the reloaded poll carries a blank one; the commands
    /// it would decrypt are already persisted.
    pub fn from_json(poll_id: PollId, json: &PollJson, logger: &Logger) -> Result<Self, CryptoError> {
        let mut poll = Poll::new(
            poll_id,
            field_from_dec_str(&json.poll_end_timestamp)?,
            Keypair::blank(),
            json.tree_depths,
            json.batch_sizes,
            json.max_values,
            logger,
        );

        for (message, enc_pub_key) in json.messages.iter().zip(&json.enc_pub_keys) {
            let message = message.decode()?;
            let enc_pub_key = decode_pub_key_pair(enc_pub_key)?;
            poll.message_tree.insert(message.hash(&enc_pub_key));
            poll.messages.push(message);
            poll.enc_pub_keys.push(enc_pub_key);
        }
        poll.commands = json
            .commands
            .iter()
            .map(CommandJson::decode)
            .collect::<Result<_, _>>()?;
        poll.ballots = json
            .ballots
            .iter()
            .map(BallotJson::decode)
            .collect::<Result<_, _>>()?;
        poll.state_leaves = json
            .state_leaves
            .iter()
            .map(StateLeafJson::decode)
            .collect::<Result<_, _>>()?;
        poll.results = json
            .results
            .iter()
            .map(|value| field_from_dec_str(value))
            .collect::<Result<_, _>>()?;
        poll.current_message_batch_index = json.current_message_batch_index;
        poll.num_batches_processed = json.num_batches_processed;
        Ok(poll)
    }

    /// Rebuild the state and ballot trees after [`Poll::from_json`].
    ///
    /// When the persisted poll had already snapshotted (non-empty leaves or
    /// ballots), the trees are reconstructed from the persisted snapshot;
    /// otherwise the registry is snapshotted fresh, exactly as the first
    /// processing call would have done.
    pub fn restore_state(
        &mut self,
        state_leaves: &[StateLeaf],
        state_tree: &IncrementalQuinTree,
        num_sign_ups: usize,
    ) {
        let saved_leaves = std::mem::take(&mut self.state_leaves);
        let saved_ballots = std::mem::take(&mut self.ballots);
        self.state_copied = false;
        self.copy_state_from_maci(state_leaves, state_tree, num_sign_ups);

        if !saved_leaves.is_empty() || !saved_ballots.is_empty() {
            let mut rebuilt_state_tree = IncrementalQuinTree::new(
                self.tree_depths.state_tree_depth,
                StateLeaf::blank().hash(),
            );
            for leaf in &saved_leaves {
                rebuilt_state_tree.insert(leaf.hash());
            }
            let mut rebuilt_ballot_tree = IncrementalQuinTree::new(
                self.tree_depths.state_tree_depth,
                Ballot::blank(self.tree_depths.vote_option_tree_depth).hash(),
            );
            for ballot in &saved_ballots {
                rebuilt_ballot_tree.insert(ballot.hash());
            }
            self.state_leaves = saved_leaves;
            self.state_tree = Some(rebuilt_state_tree);
            self.ballots = saved_ballots;
            self.ballot_tree = Some(rebuilt_ballot_tree);
        }
    }
}

/// Polls compare by their parameters and ingested sequences. Trees and
/// phase progress are derived state and do not participate.
impl PartialEq for Poll {
    fn eq(&self, other: &Self) -> bool {
        self.poll_id == other.poll_id
            && self.poll_end_timestamp == other.poll_end_timestamp
            && self.tree_depths == other.tree_depths
            && self.batch_sizes == other.batch_sizes
            && self.max_values == other.max_values
            && self.messages == other.messages
            && self.enc_pub_keys == other.enc_pub_keys
    }
}

impl Eq for Poll {}

pub(crate) fn pub_key_pair(key: &PublicKey) -> [String; 2] {
    [field_to_dec_string(&key.x), field_to_dec_string(&key.y)]
}

pub(crate) fn decode_pub_key_pair(pair: &[String; 2]) -> Result<PublicKey, CryptoError> {
    Ok(PublicKey::new(
        field_from_dec_str(&pair[0])?,
        field_from_dec_str(&pair[1])?,
    ))
}

pub(crate) fn fields_to_strings(values: &[Field]) -> Vec<String> {
    values.iter().map(field_to_dec_string).collect()
}

pub(crate) fn path_elements_to_strings(path: &MerklePath) -> Vec<Vec<String>> {
    path.elements.iter().map(|level| fields_to_strings(level)).collect()
}

/// Stable persisted layout. All big integers are base-10 strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollJson {
    pub poll_end_timestamp: String,
    pub tree_depths: TreeDepths,
    pub batch_sizes: BatchSizes,
    pub max_values: MaxValues,
    pub messages: Vec<MessageJson>,
    pub commands: Vec<CommandJson>,
    pub ballots: Vec<BallotJson>,
    pub enc_pub_keys: Vec<[String; 2]>,
    pub current_message_batch_index: Option<usize>,
    pub state_leaves: Vec<StateLeafJson>,
    pub results: Vec<String>,
    pub num_batches_processed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageJson {
    pub msg_type: String,
    pub data: Vec<String>,
}

impl From<&Message> for MessageJson {
    fn from(message: &Message) -> Self {
        Self {
            msg_type: field_to_dec_string(&message.msg_type),
            data: fields_to_strings(&message.data),
        }
    }
}

impl MessageJson {
    fn decode(&self) -> Result<Message, CryptoError> {
        let mut data = [Field::zero(); MESSAGE_DATA_LENGTH];
        if self.data.len() != MESSAGE_DATA_LENGTH {
            return Err(CryptoError::InvalidFieldString(format!(
                "message data of {} words",
                self.data.len()
            )));
        }
        for (slot, value) in data.iter_mut().zip(&self.data) {
            *slot = field_from_dec_str(value)?;
        }
        Ok(Message::new(field_from_dec_str(&self.msg_type)?, data))
    }
}

/// Commands are tagged by `cmdType`: `"1"` for votes, `"2"` for topups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmdType")]
pub enum CommandJson {
    #[serde(rename = "1", rename_all = "camelCase")]
    Vote {
        state_index: String,
        new_pub_key: [String; 2],
        vote_option_index: String,
        new_vote_weight: String,
        nonce: String,
        poll_id: String,
        salt: String,
    },
    #[serde(rename = "2", rename_all = "camelCase")]
    Topup {
        state_index: String,
        amount: String,
        poll_id: String,
    },
}

impl From<&Command> for CommandJson {
    fn from(command: &Command) -> Self {
        match command {
            Command::Vote(vote) => CommandJson::Vote {
                state_index: field_to_dec_string(&vote.state_index),
                new_pub_key: pub_key_pair(&vote.new_pub_key),
                vote_option_index: field_to_dec_string(&vote.vote_option_index),
                new_vote_weight: field_to_dec_string(&vote.new_vote_weight),
                nonce: field_to_dec_string(&vote.nonce),
                poll_id: field_to_dec_string(&vote.poll_id),
                salt: field_to_dec_string(&vote.salt),
            },
            Command::Topup(topup) => CommandJson::Topup {
                state_index: field_to_dec_string(&topup.state_index),
                amount: field_to_dec_string(&topup.amount),
                poll_id: field_to_dec_string(&topup.poll_id),
            },
        }
    }
}

impl CommandJson {
    fn decode(&self) -> Result<Command, CryptoError> {
        match self {
            CommandJson::Vote {
                state_index,
                new_pub_key,
                vote_option_index,
                new_vote_weight,
                nonce,
                poll_id,
                salt,
            } => Ok(Command::Vote(VoteCommand::new(
                field_from_dec_str(state_index)?,
                decode_pub_key_pair(new_pub_key)?,
                field_from_dec_str(vote_option_index)?,
                field_from_dec_str(new_vote_weight)?,
                field_from_dec_str(nonce)?,
                field_from_dec_str(poll_id)?,
                field_from_dec_str(salt)?,
            ))),
            CommandJson::Topup { state_index, amount, poll_id } => {
                Ok(Command::Topup(TopupCommand::new(
                    field_from_dec_str(state_index)?,
                    field_from_dec_str(amount)?,
                    field_from_dec_str(poll_id)?,
                )))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotJson {
    pub nonce: String,
    pub votes: Vec<String>,
    pub vote_option_tree_depth: usize,
}

impl From<&Ballot> for BallotJson {
    fn from(ballot: &Ballot) -> Self {
        Self {
            nonce: field_to_dec_string(&ballot.nonce),
            votes: fields_to_strings(&ballot.votes),
            vote_option_tree_depth: ballot.vote_option_tree_depth,
        }
    }
}

impl BallotJson {
    fn decode(&self) -> Result<Ballot, CryptoError> {
        Ok(Ballot {
            nonce: field_from_dec_str(&self.nonce)?,
            votes: self
                .votes
                .iter()
                .map(|value| field_from_dec_str(value))
                .collect::<Result<_, _>>()?,
            vote_option_tree_depth: self.vote_option_tree_depth,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateLeafJson {
    pub pub_key: [String; 2],
    pub voice_credit_balance: String,
    pub timestamp: String,
}

impl From<&StateLeaf> for StateLeafJson {
    fn from(leaf: &StateLeaf) -> Self {
        Self {
            pub_key: pub_key_pair(&leaf.pub_key),
            voice_credit_balance: field_to_dec_string(&leaf.voice_credit_balance),
            timestamp: field_to_dec_string(&leaf.timestamp),
        }
    }
}

impl StateLeafJson {
    fn decode(&self) -> Result<StateLeaf, CryptoError> {
        Ok(StateLeaf::new(
            decode_pub_key_pair(&self.pub_key)?,
            field_from_dec_str(&self.voice_credit_balance)?,
            field_from_dec_str(&self.timestamp)?,
        ))
    }
}
