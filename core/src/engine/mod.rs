// Copyright (c) 2022-2023 The MobileCoin Foundation

//! The [Engine] tracks the protocol-level state of a wallet session.
//!
//! This handles [Event] inputs and returns [Output]s to the caller, see
//! [TransitionTable] for the rules applied to each input.

use hwlink_proto::{
    messages::{ButtonRequest, ButtonRequestType, Features, TxRequest},
    Message,
};

mod event;
pub use event::{Event, SystemEvent};

mod state;
pub use state::{States, WalletState};

mod table;
pub use table::{Effect, Next, Rule, TransitionTable};

mod output;
pub use output::Output;

/// [Listener] receives semantic callbacks from an [Engine]
///
/// All methods default to no-ops, implement those of interest.
pub trait Listener {
    /// Called with the decoded message for each dispatched [Effect]
    fn on_effect(&mut self, _effect: Effect, _msg: &Message) {}

    /// Called for each system event received
    fn on_system(&mut self, _evt: SystemEvent) {}

    /// Called whenever the wallet state changes
    fn on_state(&mut self, _from: WalletState, _to: WalletState) {}
}

impl Listener for () {}

impl<T: Listener> Listener for &mut T {
    fn on_effect(&mut self, effect: Effect, msg: &Message) {
        T::on_effect(self, effect, msg)
    }

    fn on_system(&mut self, evt: SystemEvent) {
        T::on_system(self, evt)
    }

    fn on_state(&mut self, from: WalletState, to: WalletState) {
        T::on_state(self, from, to)
    }
}

/// [Engine] provides transport-independent wallet state tracking
pub struct Engine<L: Listener = ()> {
    state: WalletState,
    /// Last idle state, restored when an operation completes
    base: WalletState,
    table: TransitionTable,
    auto_reply: bool,
    listener: L,
}

impl Engine<()> {
    /// Create a new engine with the default transition table
    pub fn new() -> Self {
        Self::with_listener(())
    }
}

impl Default for Engine<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Listener> Engine<L> {
    /// Create a new engine dispatching callbacks to the provided listener
    pub fn with_listener(listener: L) -> Self {
        Self {
            state: WalletState::Wiped,
            base: WalletState::Wiped,
            table: TransitionTable::default(),
            auto_reply: true,
            listener,
        }
    }

    /// Replace the transition table
    pub fn with_table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    /// Enable or disable protocol-mandated automatic replies
    pub fn with_auto_reply(mut self, enabled: bool) -> Self {
        self.auto_reply = enabled;
        self
    }

    /// Fetch the current wallet state
    pub fn state(&self) -> WalletState {
        self.state
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Mutable access to the table, for device specific rules
    pub fn table_mut(&mut self) -> &mut TransitionTable {
        &mut self.table
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Handle a single event, updating state and dispatching callbacks
    pub fn handle(&mut self, evt: &Event) -> Output {
        let previous = self.state;

        // Dead sessions absorb everything
        if previous.is_terminal() {
            #[cfg(feature = "log")]
            log::debug!("ignoring {evt:?} in terminal state {previous}");

            return Output {
                previous,
                state: previous,
                effect: Effect::Ignored,
                reply: None,
            };
        }

        let (next, effect, reply) = match evt {
            Event::System(s) => {
                self.listener.on_system(*s);
                (Self::system_next(previous, *s), Effect::System, None)
            }
            Event::Protocol(m) => {
                let rule = self.table.lookup(previous, m.kind);

                if rule == Rule::UNEXPECTED {
                    #[cfg(feature = "log")]
                    log::warn!("unexpected {m:?} in state {previous}, continuing");
                }

                let next = self.resolve(rule.next, m);

                self.listener.on_effect(rule.effect, m);

                let reply = match (self.auto_reply, rule.reply) {
                    (true, Some(r)) => Some(Message::empty(r)),
                    _ => None,
                };

                (next, rule.effect, reply)
            }
        };

        if next.is_base() {
            self.base = next;
        }
        self.state = next;

        if previous != next {
            #[cfg(feature = "log")]
            log::debug!("state {previous} -> {next}");

            self.listener.on_state(previous, next);
        }

        Output {
            previous,
            state: next,
            effect,
            reply,
        }
    }

    /// Resolve the next state for a rule
    fn resolve(&self, next: Next, m: &Message) -> WalletState {
        match next {
            Next::Stay => self.state,
            Next::To(s) => s,
            Next::Base => self.base,
            Next::FromFeatures => match m.decode_proto::<Features>() {
                Ok(f) if f.initialized == Some(true) => WalletState::Initialised,
                Ok(_) => WalletState::Wiped,
                Err(_e) => {
                    #[cfg(feature = "log")]
                    log::warn!("failed to decode features: {_e}");
                    self.base
                }
            },
            Next::FromButton => match m.decode_proto::<ButtonRequest>().map(|b| b.kind()) {
                Ok(Some(ButtonRequestType::ProtectCall)) => WalletState::AwaitingCipherKey,
                _ => WalletState::AwaitingButton,
            },
            Next::FromTxRequest => match m.decode_proto::<TxRequest>() {
                Ok(r) if r.is_finished() => self.base,
                _ => WalletState::SigningTransaction,
            },
        }
    }

    /// System events move live sessions to terminal states
    fn system_next(state: WalletState, evt: SystemEvent) -> WalletState {
        match evt {
            SystemEvent::Disconnected => WalletState::Disconnected,
            SystemEvent::DeviceFailed | SystemEvent::ConnectFailed => WalletState::Failed,
            SystemEvent::Connected | SystemEvent::SchemeViolation | SystemEvent::DeviceBusy => {
                state
            }
        }
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use hwlink_proto::{
        messages::{Failure, Success, TxRequestType},
        MessageType,
    };

    use super::*;

    lazy_static::lazy_static! {
        /// Message types outside the catalog
        static ref UNKNOWN_KINDS: [u16; 4] = [8, 0x1234, 0x7fff, 0xfeff];
    }

    #[derive(Default)]
    struct TestListener {
        effects: Vec<(Effect, u16)>,
        states: Vec<(WalletState, WalletState)>,
        system: Vec<SystemEvent>,
    }

    impl Listener for TestListener {
        fn on_effect(&mut self, effect: Effect, msg: &Message) {
            self.effects.push((effect, msg.kind));
        }

        fn on_system(&mut self, evt: SystemEvent) {
            self.system.push(evt);
        }

        fn on_state(&mut self, from: WalletState, to: WalletState) {
            self.states.push((from, to));
        }
    }

    fn features(initialized: bool) -> Event {
        let f = Features {
            initialized: Some(initialized),
            ..Default::default()
        };
        Event::Protocol(Message::encode_proto(MessageType::Features, &f))
    }

    fn button(code: ButtonRequestType) -> Event {
        let b = ButtonRequest {
            code: Some(code as u32),
            data: None,
        };
        Event::Protocol(Message::encode_proto(MessageType::ButtonRequest, &b))
    }

    fn tx_request(t: TxRequestType) -> Event {
        let r = TxRequest {
            request_type: Some(t as u32),
        };
        Event::Protocol(Message::encode_proto(MessageType::TxRequest, &r))
    }

    fn empty(t: MessageType) -> Event {
        Event::Protocol(Message::empty(t))
    }

    /// Drive an engine into the requested state
    fn engine_in(state: WalletState) -> Engine {
        let mut e = Engine::new();

        let path: Vec<Event> = match state {
            WalletState::Wiped => vec![],
            WalletState::Initialised => vec![features(true)],
            WalletState::AwaitingPin => vec![features(true), empty(MessageType::PinMatrixRequest)],
            WalletState::AwaitingPassphrase => {
                vec![features(true), empty(MessageType::PassphraseRequest)]
            }
            WalletState::AwaitingButton => vec![features(true), button(ButtonRequestType::Other)],
            WalletState::AwaitingCipherKey => {
                vec![features(true), button(ButtonRequestType::ProtectCall)]
            }
            WalletState::AwaitingWord => vec![empty(MessageType::WordRequest)],
            WalletState::SigningTransaction => {
                vec![features(true), tx_request(TxRequestType::Input)]
            }
            WalletState::Failed => vec![Event::System(SystemEvent::DeviceFailed)],
            WalletState::Disconnected => vec![Event::System(SystemEvent::Disconnected)],
        };

        for evt in &path {
            e.handle(evt);
        }
        assert_eq!(e.state(), state);

        e
    }

    #[test]
    fn starts_wiped() {
        assert_eq!(Engine::new().state(), WalletState::Wiped);
    }

    #[test]
    fn entropy_request_in_wiped_stays_wiped() {
        let mut e = Engine::new();

        let o = e.handle(&empty(MessageType::EntropyRequest));

        assert_eq!(o.previous, WalletState::Wiped);
        assert_eq!(o.state, WalletState::Wiped);
        assert_eq!(o.effect, Effect::Unexpected);
        assert_eq!(o.reply, None);
    }

    #[test]
    fn untabled_pairs_leave_state_unchanged() {
        let table = TransitionTable::default();

        let kinds: Vec<u16> = MessageType::iter()
            .map(|t| t.id())
            .chain(UNKNOWN_KINDS.iter().copied())
            .collect();

        for state in WalletState::iter() {
            for kind in &kinds {
                if table.is_tabled(state, *kind) {
                    continue;
                }

                let mut e = engine_in(state);
                let o = e.handle(&Event::Protocol(Message::new(*kind, vec![0xff; 3])));

                assert_eq!(e.state(), state, "state changed for ({state}, {kind})");
                assert!(!o.changed());
                assert!(matches!(o.effect, Effect::Unexpected | Effect::Ignored));
            }
        }
    }

    #[test]
    fn features_select_base_state() {
        let mut e = Engine::new();

        assert_eq!(e.handle(&features(true)).state, WalletState::Initialised);
        assert_eq!(e.handle(&features(false)).state, WalletState::Wiped);
    }

    #[test]
    fn pin_entry_returns_to_base() {
        let mut e = engine_in(WalletState::Initialised);

        let o = e.handle(&empty(MessageType::PinMatrixRequest));
        assert_eq!(o.state, WalletState::AwaitingPin);
        assert_eq!(o.effect, Effect::PinRequest);

        let s = Message::encode_proto(
            MessageType::Success,
            &Success {
                message: Some("ok".to_string()),
            },
        );
        let o = e.handle(&Event::Protocol(s));
        assert_eq!(o.state, WalletState::Initialised);
        assert_eq!(o.effect, Effect::Success);
    }

    #[test]
    fn failure_returns_to_wiped_base() {
        let mut e = engine_in(WalletState::Wiped);

        e.handle(&empty(MessageType::PinMatrixRequest));
        assert_eq!(e.state(), WalletState::AwaitingPin);

        let f = Message::encode_proto(
            MessageType::Failure,
            &Failure {
                code: Some(4),
                message: Some("cancelled".to_string()),
            },
        );
        let o = e.handle(&Event::Protocol(f));
        assert_eq!(o.state, WalletState::Wiped);
        assert_eq!(o.effect, Effect::Failure);
    }

    #[test]
    fn button_request_acknowledged() {
        let mut e = engine_in(WalletState::Initialised);

        let o = e.handle(&button(ButtonRequestType::Address));
        assert_eq!(o.state, WalletState::AwaitingButton);
        assert_eq!(o.reply, Some(Message::empty(MessageType::ButtonAck)));

        let o = e.handle(&empty(MessageType::Address));
        assert_eq!(o.state, WalletState::Initialised);
        assert_eq!(o.effect, Effect::Response);
    }

    #[test]
    fn auto_reply_can_be_disabled() {
        let mut e = Engine::new().with_auto_reply(false);

        let o = e.handle(&button(ButtonRequestType::Other));
        assert_eq!(o.state, WalletState::AwaitingButton);
        assert_eq!(o.reply, None);
    }

    #[test]
    fn cipher_key_flow() {
        let mut e = engine_in(WalletState::AwaitingCipherKey);

        let o = e.handle(&empty(MessageType::CipheredKeyValue));
        assert_eq!(o.state, WalletState::Initialised);
    }

    #[test]
    fn transaction_signing_flow() {
        let mut e = engine_in(WalletState::SigningTransaction);

        e.handle(&button(ButtonRequestType::ConfirmOutput));
        assert_eq!(e.state(), WalletState::AwaitingButton);

        e.handle(&tx_request(TxRequestType::Output));
        assert_eq!(e.state(), WalletState::SigningTransaction);

        e.handle(&tx_request(TxRequestType::Finished));
        assert_eq!(e.state(), WalletState::Initialised);
    }

    #[test]
    fn transactions_require_provisioning() {
        let mut e = engine_in(WalletState::Wiped);

        let o = e.handle(&tx_request(TxRequestType::Input));
        assert_eq!(o.state, WalletState::Wiped);
        assert_eq!(o.effect, Effect::Unexpected);
    }

    #[test]
    fn system_events_are_terminal() {
        for state in WalletState::iter().filter(|s| !s.is_terminal()) {
            let mut e = engine_in(state);
            e.handle(&Event::System(SystemEvent::Disconnected));
            assert_eq!(e.state(), WalletState::Disconnected);

            // No further transitions on a dead session
            let o = e.handle(&features(true));
            assert_eq!(o.state, WalletState::Disconnected);
            assert_eq!(o.effect, Effect::Ignored);

            let o = e.handle(&Event::System(SystemEvent::DeviceFailed));
            assert_eq!(o.state, WalletState::Disconnected);

            let mut e = engine_in(state);
            e.handle(&Event::System(SystemEvent::DeviceFailed));
            assert_eq!(e.state(), WalletState::Failed);
        }
    }

    #[test]
    fn non_terminal_system_events_keep_state() {
        let mut e = engine_in(WalletState::AwaitingPin);

        for s in [
            SystemEvent::Connected,
            SystemEvent::SchemeViolation,
            SystemEvent::DeviceBusy,
        ] {
            let o = e.handle(&Event::System(s));
            assert_eq!(o.state, WalletState::AwaitingPin);
            assert_eq!(o.effect, Effect::System);
        }
    }

    #[test]
    fn listener_receives_callbacks() {
        let mut e = Engine::with_listener(TestListener::default());

        e.handle(&Event::System(SystemEvent::Connected));
        e.handle(&features(true));
        e.handle(&empty(MessageType::EntropyRequest));
        e.handle(&Event::System(SystemEvent::Disconnected));

        let l = e.listener();
        assert_eq!(
            l.system,
            vec![SystemEvent::Connected, SystemEvent::Disconnected]
        );
        assert_eq!(
            l.effects,
            vec![
                (Effect::Features, MessageType::Features.id()),
                (Effect::Unexpected, MessageType::EntropyRequest.id()),
            ]
        );
        assert_eq!(
            l.states,
            vec![
                (WalletState::Wiped, WalletState::Initialised),
                (WalletState::Initialised, WalletState::Disconnected),
            ]
        );
    }

    #[test]
    fn custom_rules_extend_table() {
        let mut e = Engine::new();
        e.table_mut().insert(
            States::WIPED,
            MessageType::EntropyRequest,
            Rule::new(Next::To(WalletState::AwaitingButton), Effect::Response)
                .with_reply(MessageType::Cancel),
        );

        let o = e.handle(&empty(MessageType::EntropyRequest));
        assert_eq!(o.state, WalletState::AwaitingButton);
        assert_eq!(o.reply, Some(Message::empty(MessageType::Cancel)));
    }
}
