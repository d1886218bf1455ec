//! Drives two `Endpoint`s against each other over an in-memory wire, the
//! way two peers of a real connection would: no loss, then lossy,
//! verifying delivery, acks and the smoothed stats converge sensibly.

mod support;

use relaynet::config::EndpointConfig;
use relaynet::logging;
use relaynet::reliability::Endpoint;
use support::QueueTransport;

fn endpoint(id: u64, config: EndpointConfig) -> Endpoint<QueueTransport> {
    Endpoint::new(id, config, QueueTransport::new(), logging::discard())
}

#[test]
fn two_endpoints_exchange_packets_with_no_loss() {
    let mut a = endpoint(1, EndpointConfig::default());
    let mut b = endpoint(2, EndpointConfig::default());

    for i in 0..20u32 {
        a.update(i as f64 * 0.1);
        b.update(i as f64 * 0.1);

        a.send(format!("from-a-{}", i).as_bytes()).unwrap();
        for wire in a.transport().drain_outbox() {
            b.receive(&wire).unwrap();
        }

        b.send(format!("from-b-{}", i).as_bytes()).unwrap();
        for wire in b.transport().drain_outbox() {
            a.receive(&wire).unwrap();
        }
    }

    assert_eq!(b.transport().delivered().len(), 20);
    assert_eq!(a.transport().delivered().len(), 20);
    assert_eq!(b.transport().delivered()[5], b"from-a-5");

    // Every packet after the first round-trip should be getting acked, so
    // both sides end up with an initialized RTT estimate.
    assert!(a.rtt_ms().is_some());
    assert!(b.rtt_ms().is_some());
    assert_eq!(a.counters.packets_invalid(), 0);
    assert_eq!(b.counters.packets_invalid(), 0);
}

#[test]
fn lossy_link_still_delivers_most_packets_and_tracks_loss() {
    let mut config = EndpointConfig::default();
    config.loss_alpha = 1.0; // snap straight to the latest sample, no smoothing lag
    let mut a = endpoint(1, config.clone());
    let mut b = endpoint(2, config);

    let mut delivered_to_b = 0usize;
    for i in 0..60u32 {
        let now = i as f64 * 0.05;
        a.update(now);
        b.update(now);

        a.send(&i.to_le_bytes()).unwrap();
        for (idx, wire) in a.transport().drain_outbox().into_iter().enumerate() {
            // Drop every other packet deterministically.
            if (i as usize + idx) % 2 == 0 {
                continue;
            }
            b.receive(&wire).unwrap();
            delivered_to_b += 1;

            // Let acks flow back so `a`'s loss/RTT stats have something to sample.
            b.send(b"ack-carrier").unwrap();
            for reply in b.transport().drain_outbox() {
                a.receive(&reply).unwrap();
            }
        }
    }

    assert!(delivered_to_b > 0 && delivered_to_b < 60);
    assert_eq!(b.transport().delivered().len(), delivered_to_b);

    a.update(10.0);
    let loss = a.packet_loss_pct().expect("loss estimate should be initialized after drops");
    assert!(loss > 0.0, "loss estimate should reflect the dropped packets, got {}", loss);
}

#[test]
fn receiver_rejecting_payloads_still_acks_but_counts_invalid() {
    let mut a = endpoint(1, EndpointConfig::default());
    let mut b = endpoint(2, EndpointConfig::default());
    *b.transport().accept.borrow_mut() = false;

    a.send(b"rejected").unwrap();
    for wire in a.transport().drain_outbox() {
        b.receive(&wire).unwrap();
    }

    assert_eq!(b.counters.packets_received(), 0);
    assert_eq!(b.counters.packets_invalid(), 1);
    assert_eq!(b.transport().delivered().len(), 1);
}
