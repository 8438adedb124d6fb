//! Subscription lifecycle state machine.
//!
//! One topic has exactly one transport subscription; the state it is in
//! decides whether inbound events are dispatched at all. Transitions are a
//! pure function of (state, signal) so they can be tested without a live
//! transport.

use strum::Display;

use crate::transport::TransportStatus;

/// Connection state of one stream's topic subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionState {
    Connecting,
    Subscribed,
    Closed,
    TimedOut,
    Error,
    Reconnecting,
}

/// Something that can move the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// The transport reported a lifecycle change.
    Transport(TransportStatus),
    /// The application asked for a fresh connection.
    ReconnectRequested,
}

impl SubscriptionState {
    /// Pure transition function.
    ///
    /// `Reconnecting` is only left by the transport starting its next dial
    /// (`Connecting`); a reconnect request wins from any state.
    #[must_use]
    pub fn apply(self, signal: &LifecycleSignal) -> Self {
        match signal {
            LifecycleSignal::ReconnectRequested => Self::Reconnecting,
            LifecycleSignal::Transport(status) => match status {
                TransportStatus::Connecting => Self::Connecting,
                TransportStatus::Subscribed => Self::Subscribed,
                TransportStatus::Closed => Self::Closed,
                TransportStatus::TimedOut => match self {
                    Self::Subscribed | Self::Connecting => Self::TimedOut,
                    other => other,
                },
                TransportStatus::Error(_) => Self::Error,
            },
        }
    }

    /// Events are only dispatched while subscribed; anything arriving during
    /// a reconnect is dropped, since the resync after reconnecting covers
    /// the gap.
    #[must_use]
    pub const fn accepts_events(self) -> bool {
        matches!(self, Self::Subscribed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn subscribed() -> LifecycleSignal {
        LifecycleSignal::Transport(TransportStatus::Subscribed)
    }

    #[test_case(SubscriptionState::Connecting, subscribed(), SubscriptionState::Subscribed; "connect completes")]
    #[test_case(SubscriptionState::Subscribed, LifecycleSignal::Transport(TransportStatus::Closed), SubscriptionState::Closed; "server closes")]
    #[test_case(SubscriptionState::Subscribed, LifecycleSignal::Transport(TransportStatus::TimedOut), SubscriptionState::TimedOut; "stream times out")]
    #[test_case(SubscriptionState::Closed, LifecycleSignal::Transport(TransportStatus::TimedOut), SubscriptionState::Closed; "timeout after close is ignored")]
    #[test_case(SubscriptionState::Subscribed, LifecycleSignal::Transport(TransportStatus::Error("boom".into())), SubscriptionState::Error; "error from subscribed")]
    #[test_case(SubscriptionState::Connecting, LifecycleSignal::Transport(TransportStatus::Error("boom".into())), SubscriptionState::Error; "error from connecting")]
    #[test_case(SubscriptionState::Subscribed, LifecycleSignal::ReconnectRequested, SubscriptionState::Reconnecting; "forced reconnect")]
    #[test_case(SubscriptionState::Error, LifecycleSignal::ReconnectRequested, SubscriptionState::Reconnecting; "reconnect from error")]
    #[test_case(SubscriptionState::Reconnecting, LifecycleSignal::Transport(TransportStatus::Connecting), SubscriptionState::Connecting; "reconnect redials")]
    fn transitions(from: SubscriptionState, signal: LifecycleSignal, to: SubscriptionState) {
        assert_eq!(from.apply(&signal), to);
    }

    #[test]
    fn only_subscribed_accepts_events() {
        for state in [
            SubscriptionState::Connecting,
            SubscriptionState::Closed,
            SubscriptionState::TimedOut,
            SubscriptionState::Error,
            SubscriptionState::Reconnecting,
        ] {
            assert!(!state.accepts_events());
        }
        assert!(SubscriptionState::Subscribed.accepts_events());
    }

    #[test]
    fn display_is_snake_case() {
        assert_eq!(SubscriptionState::TimedOut.to_string(), "timed_out");
        assert_eq!(SubscriptionState::Reconnecting.to_string(), "reconnecting");
    }
}
