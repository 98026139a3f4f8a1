// Copyright (c) 2022-2023 The MobileCoin Foundation

use hwlink_proto::Message;

use super::{Effect, WalletState};

/// [Engine][super::Engine] result for a single handled event
#[derive(Clone, PartialEq, Debug)]
pub struct Output {
    /// State prior to the event
    pub previous: WalletState,
    /// State following the event
    pub state: WalletState,
    /// Effect dispatched for the transition
    pub effect: Effect,
    /// Automatic reply to be sent to the device
    pub reply: Option<Message>,
}

impl Output {
    /// Check whether the event changed the wallet state
    pub fn changed(&self) -> bool {
        self.previous != self.state
    }
}
