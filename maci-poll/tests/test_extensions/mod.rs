//! Shared helpers for the end-to-end poll suites.
#![allow(dead_code)] // each suite uses a different subset

use maci_crypto::{Field, Keypair, PublicKey};
use maci_poll::command::VoteCommand;
use maci_poll::logging::discard_logger;
use maci_poll::maci_state::MaciState;
use maci_poll::message::{Message, MESSAGE_DATA_LENGTH, MESSAGE_TYPE_TOPUP};
use maci_poll::parameters::{BatchSizes, MaxValues, TreeDepths};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

pub const STATE_TREE_DEPTH: usize = 10;
pub const MESSAGE_TREE_DEPTH: usize = 2;
pub const VOTE_OPTION_TREE_DEPTH: usize = 2;
pub const INITIAL_CREDITS: u64 = 100;

pub struct Scenario {
    pub maci: MaciState,
    pub poll_id: usize,
    pub coordinator: Keypair,
    pub voters: Vec<Keypair>,
    pub rng: ChaCha20Rng,
}

pub fn setup(num_voters: usize, seed: u8) -> Scenario {
    setup_with_batches(
        num_voters,
        seed,
        BatchSizes { message_batch_size: 5, tally_batch_size: 5, subsidy_batch_size: 5 },
    )
}

pub fn setup_with_batches(num_voters: usize, seed: u8, batch_sizes: BatchSizes) -> Scenario {
    let mut rng = ChaCha20Rng::from_seed([seed; 32]);
    let logger = discard_logger();
    let mut maci = MaciState::new(STATE_TREE_DEPTH, &logger);
    let coordinator = Keypair::rand(&mut rng);
    let voters: Vec<Keypair> = (0..num_voters).map(|_| Keypair::rand(&mut rng)).collect();
    for voter in &voters {
        maci.sign_up(
            voter.public_key,
            Field::from(INITIAL_CREDITS),
            Field::from(0u64),
        )
        .expect("signup should succeed");
    }
    let poll_id = maci.deploy_poll(
        Field::from(10_000_000u64),
        MaxValues { max_messages: 25, max_vote_options: 25 },
        TreeDepths {
            state_tree_depth: STATE_TREE_DEPTH,
            message_tree_depth: MESSAGE_TREE_DEPTH,
            vote_option_tree_depth: VOTE_OPTION_TREE_DEPTH,
        },
        batch_sizes,
        coordinator,
    );
    Scenario { maci, poll_id, coordinator, voters, rng }
}

impl Scenario {
    /// Encrypt and publish a vote command. `signer` signs it, `new_key`
    /// becomes the leaf key if the command is accepted.
    pub fn publish_vote(
        &mut self,
        state_index: usize,
        option: u64,
        weight: u64,
        nonce: u64,
        signer: &Keypair,
        new_key: PublicKey,
    ) {
        let command = VoteCommand::new(
            Field::from(state_index as u64),
            new_key,
            Field::from(option),
            Field::from(weight),
            Field::from(nonce),
            Field::from(self.poll_id as u64),
            Field::from(987_654u64),
        );
        let signature = command.sign(&signer.private_key);
        let ephemeral = Keypair::rand(&mut self.rng);
        let shared_key = ephemeral
            .gen_ecdh_shared_key(&self.coordinator.public_key)
            .expect("coordinator key is valid");
        let message = command.encrypt(&signature, shared_key);
        self.maci.polls[self.poll_id].publish_message(message, ephemeral.public_key);
    }

    pub fn publish_topup(&mut self, state_index: u64, amount: u64) {
        let mut data = [Field::from(0u64); MESSAGE_DATA_LENGTH];
        data[0] = Field::from(state_index);
        data[1] = Field::from(amount);
        self.maci.polls[self.poll_id]
            .topup_message(Message::new(Field::from(MESSAGE_TYPE_TOPUP), data));
    }

    pub fn process_all(&mut self) {
        while self.maci.polls[self.poll_id].has_unprocessed_messages() {
            self.maci
                .process_messages(self.poll_id, &mut self.rng)
                .expect("processing should succeed");
        }
    }

    pub fn tally_all(&mut self) {
        while self.maci.polls[self.poll_id].has_untallied_ballots() {
            self.maci
                .tally_votes(self.poll_id, &mut self.rng)
                .expect("tallying should succeed");
        }
    }
}
