//! Turn scheduler behavior with a threaded harness: FIFO fairness, single
//! holder, disconnect handling.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crowdplay_netd::config::Config;
use crowdplay_netd::emu::TurnScheduler;
use crowdplay_netd::server::ServerCore;
use crowdplay_netd::user::User;
use crowdplay_retro::RetroPad;

const EMU: &str = "emu1";

struct Harness {
    server: Arc<ServerCore>,
    sched: TurnScheduler,
    users: Vec<Arc<User>>,
    _outboxes: Vec<mpsc::Receiver<Message>>,
}

impl Harness {
    fn new(turn_length: Duration, names: &[&str]) -> Self {
        let (server, _cmd_rx) = ServerCore::new(Config::default());
        let pad = Arc::new(RetroPad::new());
        let sched = TurnScheduler::spawn(
            Arc::clone(&server),
            EMU.to_string(),
            pad,
            turn_length,
        );

        let mut users = Vec::new();
        let mut outboxes = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let (tx, rx) = mpsc::channel(64);
            let user = Arc::new(User::new(i as u64 + 1, tx, CancellationToken::new()));
            user.set_username(name);
            user.set_connected_emu(EMU);
            server.insert_user(Arc::clone(&user));
            users.push(user);
            outboxes.push(rx);
        }

        Self {
            server,
            sched,
            users,
            _outboxes: outboxes,
        }
    }

    fn request_turn(&self, user: &Arc<User>) {
        user.requested_turn.store(true, Ordering::Release);
        self.sched.add_request(user);
    }

    fn holder_name(&self) -> Option<String> {
        self.sched.current_holder().map(|user| user.username())
    }

    /// Poll until `cond` holds, failing the test on timeout.
    fn wait_until(&self, what: &str, timeout: Duration, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("timed out waiting for {what}");
    }

    fn holders_with_turn(&self) -> usize {
        self.users.iter().filter(|user| user.has_turn()).count()
    }

    fn stop(self) {
        self.sched.stop();
        self.server.sched.stop();
    }
}

#[test]
fn turns_rotate_in_request_order() {
    let h = Harness::new(Duration::from_millis(120), &["alice", "bob", "carol"]);
    for user in &h.users {
        h.request_turn(user);
    }

    // Record the promotion sequence while asserting the single-holder
    // invariant at every observation.
    let mut sequence: Vec<String> = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline && sequence.len() < 3 {
        assert!(h.holders_with_turn() <= 1, "more than one holder at once");
        if let Some(name) = h.holder_name()
            && sequence.last() != Some(&name)
        {
            sequence.push(name);
        }
        thread::sleep(Duration::from_millis(2));
    }

    assert_eq!(sequence, ["alice", "bob", "carol"], "promotion order");

    // Once everyone had a turn the queue drains and flags are clear.
    h.wait_until("queue to drain", Duration::from_secs(2), || {
        h.sched.queue_len() == 0
    });
    for user in &h.users {
        assert!(!user.has_turn());
    }
    h.stop();
}

#[test]
fn requeue_after_a_turn_goes_to_the_back() {
    let h = Harness::new(Duration::from_millis(80), &["alice", "bob"]);
    let (alice, bob) = (&h.users[0], &h.users[1]);

    h.request_turn(alice);
    h.wait_until("alice to hold", Duration::from_secs(2), || {
        alice.has_turn()
    });

    // Bob queues behind, then alice re-requests after her turn ends.
    h.request_turn(bob);
    h.wait_until("alice's turn to end", Duration::from_secs(2), || {
        !alice.has_turn()
    });
    h.request_turn(alice);

    h.wait_until("bob to hold before alice again", Duration::from_secs(2), || {
        bob.has_turn()
    });
    assert!(!alice.has_turn(), "alice promoted twice before bob held once");
    h.stop();
}

#[test]
fn duplicate_requests_are_ignored() {
    let h = Harness::new(Duration::from_secs(5), &["alice", "bob"]);
    let (alice, bob) = (&h.users[0], &h.users[1]);

    h.request_turn(alice);
    h.request_turn(bob);
    h.sched.add_request(bob);
    h.sched.add_request(bob);

    h.wait_until("alice to hold", Duration::from_secs(2), || {
        alice.has_turn()
    });
    assert_eq!(h.sched.queue_len(), 2, "duplicate enqueue of a queued user");
    h.stop();
}

#[test]
fn holder_disconnect_ends_the_turn_immediately() {
    // Turn length far beyond what this test will wait: promotion of bob can
    // only happen through the early-end path.
    let h = Harness::new(Duration::from_secs(30), &["alice", "bob"]);
    let (alice, bob) = (&h.users[0], &h.users[1]);

    h.request_turn(alice);
    h.request_turn(bob);
    h.wait_until("alice to hold", Duration::from_secs(2), || {
        alice.has_turn()
    });

    // Simulate the dispatch worker handling alice's disconnect.
    h.server.remove_user(alice.conn);
    h.sched.remove_user(alice);

    h.wait_until("bob to inherit the turn", Duration::from_secs(2), || {
        bob.has_turn()
    });
    assert!(!alice.has_turn());
    assert!(!alice.requested_turn.load(Ordering::Acquire));
    assert_eq!(h.sched.queue_len(), 1, "alice still queued after disconnect");
    h.stop();
}

#[test]
fn queued_user_disconnect_leaves_the_queue() {
    let h = Harness::new(Duration::from_secs(30), &["alice", "bob", "carol"]);
    let (alice, bob, carol) = (&h.users[0], &h.users[1], &h.users[2]);

    h.request_turn(alice);
    h.request_turn(bob);
    h.request_turn(carol);
    h.wait_until("alice to hold", Duration::from_secs(2), || {
        alice.has_turn()
    });

    // Bob leaves while waiting in the middle of the queue.
    h.server.remove_user(bob.conn);
    h.sched.remove_user(bob);

    assert_eq!(h.sched.queue_len(), 2);
    assert!(!bob.requested_turn.load(Ordering::Acquire));

    // Ending alice's turn promotes carol, never bob.
    h.sched.remove_user(alice);
    h.wait_until("carol to inherit the turn", Duration::from_secs(2), || {
        carol.has_turn()
    });
    assert!(!bob.has_turn());
    h.stop();
}
