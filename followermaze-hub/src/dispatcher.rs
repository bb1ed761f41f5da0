use std::sync::Arc;
use tracing::{debug, trace, warn};

use followermaze_core::metrics::delivery::DELIVERIES;
use followermaze_core::protocol::encode;
use followermaze_core::{record_delivery_drop, Message, UserId};

use crate::client_registry::ClientRegistry;
use crate::follower_graph::FollowerGraph;
use crate::sink::{ClientSink, Line, SinkError};

/// Applies the per-kind delivery rules to messages released in order
#[derive(Clone)]
pub struct Dispatcher {
    graph: FollowerGraph,
    registry: ClientRegistry,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(graph: FollowerGraph, registry: ClientRegistry) -> Self {
        Self { graph, registry }
    }

    #[must_use]
    pub const fn graph(&self) -> &FollowerGraph {
        &self.graph
    }

    #[must_use]
    pub const fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Apply `message` to the follower graph and fan it out.
    ///
    /// Returns the number of clients the line was queued to. Targets that
    /// are not registered are skipped.
    pub fn dispatch(&self, message: &Message) -> usize {
        match *message {
            Message::Follow { from, to, .. } => {
                self.graph.add_follower(to, from);
                self.deliver_to(to, message)
            }
            Message::Unfollow { from, to, .. } => {
                self.graph.remove_follower(to, from);
                0
            }
            Message::Broadcast { .. } => {
                let line = line_for(message);
                self.registry
                    .sinks()
                    .iter()
                    .filter(|sink| deliver(sink.as_ref(), &line))
                    .count()
            }
            Message::PrivateMessage { to, .. } => self.deliver_to(to, message),
            Message::StatusUpdate { from, .. } => {
                let followers = self.graph.followers_of(from);
                if followers.is_empty() {
                    return 0;
                }
                let line = line_for(message);
                followers
                    .into_iter()
                    .filter_map(|follower| self.registry.lookup(follower))
                    .filter(|sink| deliver(sink.as_ref(), &line))
                    .count()
            }
        }
    }

    fn deliver_to(&self, target: UserId, message: &Message) -> usize {
        match self.registry.lookup(target) {
            Some(sink) => usize::from(deliver(sink.as_ref(), &line_for(message))),
            None => {
                trace!(
                    user_id = %target,
                    seq = %message.seq(),
                    kind = %message.kind(),
                    "Target not connected, message dropped"
                );
                0
            }
        }
    }
}

fn line_for(message: &Message) -> Line {
    Arc::from(encode(message))
}

/// Queue one line to one client. Failures are logged and counted, never
/// propagated, so the rest of the fan-out proceeds.
fn deliver(sink: &dyn ClientSink, line: &Line) -> bool {
    match sink.write(Arc::clone(line)) {
        Ok(()) => {
            DELIVERIES.inc();
            true
        }
        Err(SinkError::Full(user_id)) => {
            record_delivery_drop!("queue_full");
            warn!(user_id = %user_id, "Client delivery queue full, message dropped");
            false
        }
        Err(SinkError::Closed(user_id)) => {
            record_delivery_drop!("closed");
            debug!(user_id = %user_id, "Client connection closing, message dropped");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{ChannelSink, MockClientSink};
    use followermaze_core::SeqId;
    use tokio::sync::mpsc;

    fn connect(dispatcher: &Dispatcher, id: u64) -> mpsc::Receiver<Line> {
        let (sink, rx) = ChannelSink::new(UserId(id), 16);
        assert!(dispatcher.registry().register(UserId(id), Arc::new(sink)));
        rx
    }

    fn received(rx: &mut mpsc::Receiver<Line>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line.to_string());
        }
        lines
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(FollowerGraph::new(), ClientRegistry::new())
    }

    #[test]
    fn test_follow_adds_edge_and_notifies_followee() {
        let dispatcher = dispatcher();
        let mut follower = connect(&dispatcher, 1);
        let mut followee = connect(&dispatcher, 2);

        let sent = dispatcher.dispatch(&Message::Follow { seq: SeqId(1), from: UserId(1), to: UserId(2) });

        assert_eq!(sent, 1);
        assert!(dispatcher.graph().is_following(UserId(1), UserId(2)));
        assert_eq!(received(&mut followee), vec!["1|F|1|2\r\n"]);
        assert!(received(&mut follower).is_empty());
    }

    #[test]
    fn test_follow_without_followee_connected_still_adds_edge() {
        let dispatcher = dispatcher();

        let sent = dispatcher.dispatch(&Message::Follow { seq: SeqId(1), from: UserId(1), to: UserId(2) });

        assert_eq!(sent, 0);
        assert!(dispatcher.graph().is_following(UserId(1), UserId(2)));
    }

    #[test]
    fn test_unfollow_removes_edge_silently() {
        let dispatcher = dispatcher();
        let mut followee = connect(&dispatcher, 2);
        dispatcher.graph().add_follower(UserId(2), UserId(1));

        let sent = dispatcher.dispatch(&Message::Unfollow { seq: SeqId(1), from: UserId(1), to: UserId(2) });

        assert_eq!(sent, 0);
        assert!(!dispatcher.graph().is_following(UserId(1), UserId(2)));
        assert!(received(&mut followee).is_empty());
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let dispatcher = dispatcher();
        let mut a = connect(&dispatcher, 1);
        let mut b = connect(&dispatcher, 2);

        assert_eq!(dispatcher.dispatch(&Message::Broadcast { seq: SeqId(7) }), 2);
        assert_eq!(received(&mut a), vec!["7|B\r\n"]);
        assert_eq!(received(&mut b), vec!["7|B\r\n"]);
    }

    #[test]
    fn test_private_message_only_reaches_target() {
        let dispatcher = dispatcher();
        let mut sender = connect(&dispatcher, 10);
        let mut target = connect(&dispatcher, 20);

        let sent = dispatcher.dispatch(&Message::PrivateMessage { seq: SeqId(3), from: UserId(10), to: UserId(20) });

        assert_eq!(sent, 1);
        assert_eq!(received(&mut target), vec!["3|P|10|20\r\n"]);
        assert!(received(&mut sender).is_empty());
    }

    #[test]
    fn test_private_message_to_absent_target() {
        let dispatcher = dispatcher();
        let mut sender = connect(&dispatcher, 10);

        let sent = dispatcher.dispatch(&Message::PrivateMessage { seq: SeqId(3), from: UserId(10), to: UserId(20) });

        assert_eq!(sent, 0);
        assert!(received(&mut sender).is_empty());
    }

    #[test]
    fn test_status_update_reaches_connected_followers_only() {
        let dispatcher = dispatcher();
        let mut author = connect(&dispatcher, 1);
        let mut follower = connect(&dispatcher, 2);
        let mut bystander = connect(&dispatcher, 3);
        dispatcher.graph().add_follower(UserId(1), UserId(2));
        dispatcher.graph().add_follower(UserId(1), UserId(4));

        let sent = dispatcher.dispatch(&Message::StatusUpdate { seq: SeqId(5), from: UserId(1) });

        assert_eq!(sent, 1);
        assert_eq!(received(&mut follower), vec!["5|S|1\r\n"]);
        assert!(received(&mut author).is_empty());
        assert!(received(&mut bystander).is_empty());
    }

    #[test]
    fn test_failing_sink_does_not_abort_fan_out() {
        let dispatcher = dispatcher();
        let mut healthy = connect(&dispatcher, 1);

        let mut broken = MockClientSink::new();
        broken.expect_id().return_const(UserId(2));
        broken
            .expect_write()
            .times(1)
            .returning(|_| Err(SinkError::Closed(UserId(2))));
        assert!(dispatcher.registry().register(UserId(2), Arc::new(broken)));

        let sent = dispatcher.dispatch(&Message::Broadcast { seq: SeqId(1) });

        assert_eq!(sent, 1);
        assert_eq!(received(&mut healthy), vec!["1|B\r\n"]);
        // Unregistering is left to the connection that owns the sink
        assert!(dispatcher.registry().contains(UserId(2)));
    }

    #[test]
    fn test_slow_client_drops_without_affecting_others() {
        let dispatcher = dispatcher();
        let (slow_sink, mut slow_rx) = ChannelSink::new(UserId(1), 1);
        dispatcher.registry().register(UserId(1), Arc::new(slow_sink));
        let mut fast = connect(&dispatcher, 2);

        assert_eq!(dispatcher.dispatch(&Message::Broadcast { seq: SeqId(1) }), 2);
        assert_eq!(dispatcher.dispatch(&Message::Broadcast { seq: SeqId(2) }), 1);

        assert_eq!(received(&mut slow_rx), vec!["1|B\r\n"]);
        assert_eq!(received(&mut fast), vec!["1|B\r\n", "2|B\r\n"]);
    }
}
