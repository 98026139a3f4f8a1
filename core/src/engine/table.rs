// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transition table mapping `(WalletState, message type)` to [Rule]s

use std::collections::HashMap;

use strum::Display;

use hwlink_proto::MessageType;

use super::{States, WalletState};

/// Next state resolution for a [Rule]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Next {
    /// Remain in the current state
    Stay,
    /// Move to a fixed state
    To(WalletState),
    /// Return to the last idle state (`Wiped` or `Initialised`)
    Base,
    /// `Initialised` or `Wiped` per the `initialized` flag of a `Features` payload
    FromFeatures,
    /// `AwaitingCipherKey` for protected calls, otherwise `AwaitingButton`
    FromButton,
    /// Base state once signing is finished, otherwise `SigningTransaction`
    FromTxRequest,
}

/// Side effect dispatched to the [Listener][super::Listener] for a transition
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum Effect {
    /// Nothing to do
    None,
    /// No rule for this input, logged and ignored
    Unexpected,
    /// Event arrived on a terminal session
    Ignored,
    Features,
    PinRequest,
    PassphraseRequest,
    ButtonRequest,
    WordRequest,
    TxRequest,
    Success,
    Failure,
    /// Operation result (address, public key, signature etc.)
    Response,
    /// System event handled
    System,
}

/// Transition rule
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Rule {
    pub next: Next,
    pub effect: Effect,
    /// Protocol-mandated automatic reply
    pub reply: Option<MessageType>,
}

impl Rule {
    /// Rule applied to any untabled `(state, message type)` pair
    pub const UNEXPECTED: Rule = Rule::new(Next::Stay, Effect::Unexpected);

    pub const fn new(next: Next, effect: Effect) -> Self {
        Self {
            next,
            effect,
            reply: None,
        }
    }

    pub const fn with_reply(mut self, reply: MessageType) -> Self {
        self.reply = Some(reply);
        self
    }
}

/// Default rule set: (states, incoming message, rule)
const DEFAULT_RULES: &[(States, MessageType, Rule)] = &[
    (
        States::LIVE,
        MessageType::Features,
        Rule::new(Next::FromFeatures, Effect::Features),
    ),
    (
        States::LIVE,
        MessageType::PinMatrixRequest,
        Rule::new(Next::To(WalletState::AwaitingPin), Effect::PinRequest),
    ),
    (
        States::PROVISIONED,
        MessageType::PassphraseRequest,
        Rule::new(
            Next::To(WalletState::AwaitingPassphrase),
            Effect::PassphraseRequest,
        ),
    ),
    (
        States::LIVE,
        MessageType::ButtonRequest,
        Rule::new(Next::FromButton, Effect::ButtonRequest).with_reply(MessageType::ButtonAck),
    ),
    (
        States::PROVISIONED,
        MessageType::TxRequest,
        Rule::new(Next::FromTxRequest, Effect::TxRequest),
    ),
    (
        States::RECOVERY,
        MessageType::WordRequest,
        Rule::new(Next::To(WalletState::AwaitingWord), Effect::WordRequest),
    ),
    (
        States::LIVE,
        MessageType::Success,
        Rule::new(Next::Base, Effect::Success),
    ),
    (
        States::LIVE,
        MessageType::Failure,
        Rule::new(Next::Base, Effect::Failure),
    ),
    (
        States::PROVISIONED,
        MessageType::Address,
        Rule::new(Next::Base, Effect::Response),
    ),
    (
        States::PROVISIONED,
        MessageType::PublicKey,
        Rule::new(Next::Base, Effect::Response),
    ),
    (
        States::PROVISIONED,
        MessageType::MessageSignature,
        Rule::new(Next::Base, Effect::Response),
    ),
    (
        States::PROVISIONED,
        MessageType::CipheredKeyValue,
        Rule::new(Next::Base, Effect::Response),
    ),
    (
        States::PROVISIONED,
        MessageType::SignedIdentity,
        Rule::new(Next::Base, Effect::Response),
    ),
    (
        States::LIVE,
        MessageType::Entropy,
        Rule::new(Next::Base, Effect::Response),
    ),
];

/// Transition table keyed by state and raw message type
#[derive(Clone, Debug)]
pub struct TransitionTable {
    rules: HashMap<(WalletState, u16), Rule>,
}

impl TransitionTable {
    /// Create a table with no rules (every input is unexpected)
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Insert a rule for each state in the provided set,
    /// replacing existing rules for the same pairs
    pub fn insert(&mut self, states: States, kind: impl Into<u16>, rule: Rule) -> &mut Self {
        let kind = kind.into();
        for s in states.states() {
            self.rules.insert((s, kind), rule);
        }
        self
    }

    /// Remove rules for each state in the provided set
    pub fn remove(&mut self, states: States, kind: impl Into<u16>) -> &mut Self {
        let kind = kind.into();
        for s in states.states() {
            self.rules.remove(&(s, kind));
        }
        self
    }

    /// Look up the rule for a state and message type,
    /// returning [Rule::UNEXPECTED] where none is tabled
    pub fn lookup(&self, state: WalletState, kind: u16) -> Rule {
        self.rules
            .get(&(state, kind))
            .copied()
            .unwrap_or(Rule::UNEXPECTED)
    }

    /// Check whether an explicit rule exists
    pub fn is_tabled(&self, state: WalletState, kind: u16) -> bool {
        self.rules.contains_key(&(state, kind))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        let mut t = Self::empty();
        for (states, kind, rule) in DEFAULT_RULES {
            t.insert(*states, *kind, *rule);
        }
        t
    }
}
