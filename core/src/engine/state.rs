// Copyright (c) 2022-2023 The MobileCoin Foundation

use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Protocol-level wallet state
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, EnumString, EnumIter)]
pub enum WalletState {
    /// No keys provisioned (initial state)
    Wiped,
    /// Keys provisioned, device idle
    Initialised,
    /// Waiting for PIN matrix entry
    AwaitingPin,
    /// Waiting for passphrase entry
    AwaitingPassphrase,
    /// Waiting for a physical button press
    AwaitingButton,
    /// Waiting for confirmation of a cipher key operation
    AwaitingCipherKey,
    /// Waiting for a recovery word
    AwaitingWord,
    /// Transaction signing in progress
    SigningTransaction,
    /// Device failed, session must be recreated
    Failed,
    /// Transport gone, session must be recreated
    Disconnected,
}

impl WalletState {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, WalletState::Failed | WalletState::Disconnected)
    }

    /// Idle states the device returns to when an operation completes
    pub fn is_base(&self) -> bool {
        matches!(self, WalletState::Wiped | WalletState::Initialised)
    }

    /// Fetch the [States] flag for this state
    pub fn flag(&self) -> States {
        match self {
            WalletState::Wiped => States::WIPED,
            WalletState::Initialised => States::INITIALISED,
            WalletState::AwaitingPin => States::AWAITING_PIN,
            WalletState::AwaitingPassphrase => States::AWAITING_PASSPHRASE,
            WalletState::AwaitingButton => States::AWAITING_BUTTON,
            WalletState::AwaitingCipherKey => States::AWAITING_CIPHER_KEY,
            WalletState::AwaitingWord => States::AWAITING_WORD,
            WalletState::SigningTransaction => States::SIGNING_TRANSACTION,
            WalletState::Failed => States::FAILED,
            WalletState::Disconnected => States::DISCONNECTED,
        }
    }
}

bitflags::bitflags! {
    /// Set of [WalletState]s, used to declare transition rules
    pub struct States: u16 {
        const WIPED = 1 << 0;
        const INITIALISED = 1 << 1;
        const AWAITING_PIN = 1 << 2;
        const AWAITING_PASSPHRASE = 1 << 3;
        const AWAITING_BUTTON = 1 << 4;
        const AWAITING_CIPHER_KEY = 1 << 5;
        const AWAITING_WORD = 1 << 6;
        const SIGNING_TRANSACTION = 1 << 7;
        const FAILED = 1 << 8;
        const DISCONNECTED = 1 << 9;

        /// All non-terminal states
        const LIVE = Self::WIPED.bits
            | Self::INITIALISED.bits
            | Self::AWAITING_PIN.bits
            | Self::AWAITING_PASSPHRASE.bits
            | Self::AWAITING_BUTTON.bits
            | Self::AWAITING_CIPHER_KEY.bits
            | Self::AWAITING_WORD.bits
            | Self::SIGNING_TRANSACTION.bits;

        /// Non-terminal states with keys provisioned
        const PROVISIONED = Self::LIVE.bits & !Self::WIPED.bits;

        /// States seed recovery may pass through
        const RECOVERY = Self::WIPED.bits
            | Self::AWAITING_WORD.bits
            | Self::AWAITING_BUTTON.bits;
    }
}

impl States {
    /// Iterate over the [WalletState]s in this set
    pub fn states(self) -> impl Iterator<Item = WalletState> {
        WalletState::iter().filter(move |s| self.contains(s.flag()))
    }
}

impl From<WalletState> for States {
    fn from(s: WalletState) -> Self {
        s.flag()
    }
}
