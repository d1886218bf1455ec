//! The reliability endpoint. One per peer in a connection; assigns
//! sequence numbers, fragments and reassembles, extracts acks, and
//! maintains smoothed RTT/loss/bandwidth estimates.
//!
//! The endpoint holds no back-pointer to its transport: all outbound
//! traffic and payload delivery goes through the `Transport` it owns
//! directly, never the reverse.

use crate::config::{EndpointConfig, MAX_FRAGMENTS_CAP};
use crate::counters::Counters;
use crate::error::{Error, Result};
use crate::header::{PacketHeader, FRAGMENT_PREFIX_BIT};
use crate::reassembly::ReassemblyRecord;
use crate::sequence::{Sequence, SequenceBuffer};
use crate::transport::Transport;
use slog::{debug, trace, Logger};

const FRAGMENT_HEADER_SIZE: usize = 5;

#[derive(Debug, Default, Clone, Copy)]
pub struct SentRecord {
    pub time_sent: f64,
    pub size_bytes: usize,
    pub acked: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RecvRecord {
    pub time_received: f64,
    pub size_bytes: usize,
}

/// `(new_value, new_initialized)` for one EMA-smoothed statistic, applying
/// the snap-to-sample rule with `initialized` tracked as its own flag
/// rather than overloading zero to mean "no sample yet".
fn ema_update(current: f64, initialized: bool, sample: f64, alpha: f64) -> (f64, bool) {
    if !initialized || (current - sample).abs() < 1e-5 {
        (sample, true)
    } else {
        (current + (sample - current) * alpha, true)
    }
}

pub struct Endpoint<T: Transport> {
    config: EndpointConfig,
    endpoint_id: u64,
    transport: T,
    log: Logger,

    time: f64,
    next_sequence: Sequence,

    sent: SequenceBuffer<SentRecord>,
    received: SequenceBuffer<RecvRecord>,
    reassembly: SequenceBuffer<ReassemblyRecord>,
    ack_staging: Vec<Sequence>,

    pub counters: Counters,

    rtt_ms: f64,
    rtt_initialized: bool,
    packet_loss_pct: f64,
    loss_initialized: bool,
    sent_bw_kbps: f64,
    sent_bw_initialized: bool,
    received_bw_kbps: f64,
    received_bw_initialized: bool,
    acked_bw_kbps: f64,
    acked_bw_initialized: bool,
}

impl<T: Transport> Endpoint<T> {
    pub fn new(endpoint_id: u64, config: EndpointConfig, transport: T, log: Logger) -> Self {
        let sent = SequenceBuffer::new(config.sent_size);
        let received = SequenceBuffer::new(config.received_size);
        let reassembly = SequenceBuffer::new(config.reassembly_size);

        Endpoint {
            config,
            endpoint_id,
            transport,
            log,
            time: 0.0,
            next_sequence: 0,
            sent,
            received,
            reassembly,
            ack_staging: Vec::new(),
            counters: Counters::default(),
            rtt_ms: 0.0,
            rtt_initialized: false,
            packet_loss_pct: 0.0,
            loss_initialized: false,
            sent_bw_kbps: 0.0,
            sent_bw_initialized: false,
            received_bw_kbps: 0.0,
            received_bw_initialized: false,
            acked_bw_kbps: 0.0,
            acked_bw_initialized: false,
        }
    }

    #[inline]
    pub fn next_sequence(&self) -> Sequence {
        self.next_sequence
    }

    #[inline]
    pub fn acks(&self) -> &[Sequence] {
        &self.ack_staging
    }

    #[inline]
    pub fn clear_acks(&mut self) {
        self.ack_staging.clear();
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[inline]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn rtt_ms(&self) -> Option<f64> {
        self.rtt_initialized.then_some(self.rtt_ms)
    }

    pub fn packet_loss_pct(&self) -> Option<f64> {
        self.loss_initialized.then_some(self.packet_loss_pct)
    }

    pub fn sent_bw_kbps(&self) -> Option<f64> {
        self.sent_bw_initialized.then_some(self.sent_bw_kbps)
    }

    pub fn received_bw_kbps(&self) -> Option<f64> {
        self.received_bw_initialized.then_some(self.received_bw_kbps)
    }

    pub fn acked_bw_kbps(&self) -> Option<f64> {
        self.acked_bw_initialized.then_some(self.acked_bw_kbps)
    }

    /// Assigns the next sequence, fragments if needed, and hands each wire
    /// buffer to the transport. One `SentRecord` per logical packet.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_packet_size {
            Counters::inc(&self.counters.packets_too_large_to_send);
            return Err(Error::PayloadTooLarge);
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let (ack, ack_bits) = self.received.generate_ack_bits();
        let header = PacketHeader { sequence, ack, ack_bits };

        let mut total_wire_bytes = 0usize;
        let mut num_transmits = 0usize;

        if payload.len() > self.config.fragment_threshold {
            let fragment_size = self.config.fragment_size.max(1);
            let total_fragments = (payload.len() + fragment_size - 1) / fragment_size;
            let max_fragments = self.config.max_fragments.min(MAX_FRAGMENTS_CAP);

            if total_fragments > max_fragments {
                Counters::inc(&self.counters.packets_too_large_to_send);
                return Err(Error::TooManyFragments);
            }

            for fragment_id in 0..total_fragments {
                let start = fragment_id * fragment_size;
                let end = (start + fragment_size).min(payload.len());
                let chunk = &payload[start..end];

                let mut out = Vec::with_capacity(FRAGMENT_HEADER_SIZE + PacketHeader::MAX_SIZE + chunk.len());
                out.push(FRAGMENT_PREFIX_BIT);
                out.extend_from_slice(&sequence.to_le_bytes());
                out.push(fragment_id as u8);
                out.push((total_fragments - 1) as u8);
                if fragment_id == 0 {
                    header.write(&mut out);
                }
                out.extend_from_slice(chunk);

                self.transport.transmit(self.endpoint_id, sequence as u64, &out);
                total_wire_bytes += out.len();
                num_transmits += 1;
                Counters::inc(&self.counters.fragments_sent);
            }
        } else {
            let mut out = Vec::with_capacity(PacketHeader::MAX_SIZE + payload.len());
            header.write(&mut out);
            out.extend_from_slice(payload);

            self.transport.transmit(self.endpoint_id, sequence as u64, &out);
            total_wire_bytes = out.len();
            num_transmits = 1;
        }

        let size_bytes = total_wire_bytes + self.config.ip_udp_overhead * num_transmits;
        if let Some(rec) = self.sent.insert(sequence) {
            rec.time_sent = self.time;
            rec.size_bytes = size_bytes;
            rec.acked = false;
        }
        Counters::inc(&self.counters.packets_sent);
        Ok(())
    }

    /// Dispatches on the fragment bit.
    pub fn receive(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            Counters::inc(&self.counters.packets_invalid);
            return Err(Error::Overflow);
        }
        if data[0] & FRAGMENT_PREFIX_BIT != 0 {
            self.receive_fragment(data)
        } else {
            self.receive_regular(data)
        }
    }

    fn receive_regular(&mut self, data: &[u8]) -> Result<()> {
        let (header, consumed) = match PacketHeader::read(data) {
            Ok(v) => v,
            Err(e) => {
                Counters::inc(&self.counters.packets_invalid);
                return Err(e);
            }
        };

        if data.len() - consumed > self.config.max_packet_size {
            Counters::inc(&self.counters.packets_too_large_to_receive);
            debug!(self.log, "dropping oversize packet"; "sequence" => header.sequence, "len" => data.len() - consumed);
            return Err(Error::PayloadTooLarge);
        }

        if !self.received.test_insert(header.sequence) {
            Counters::inc(&self.counters.packets_stale);
            debug!(self.log, "dropping stale packet"; "sequence" => header.sequence);
            return Err(Error::Stale);
        }

        let payload = &data[consumed..];
        let accepted = self
            .transport
            .process_payload(self.endpoint_id, header.sequence as u64, payload);

        if let Some(rec) = self.received.insert(header.sequence) {
            rec.time_received = self.time;
            rec.size_bytes = data.len() + self.config.ip_udp_overhead;
        }
        self.reassembly.advance_to(header.sequence, |_| {});

        if accepted {
            Counters::inc(&self.counters.packets_received);
        } else {
            Counters::inc(&self.counters.packets_invalid);
        }

        self.process_acks(header.ack, header.ack_bits);
        Ok(())
    }

    fn receive_fragment(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < FRAGMENT_HEADER_SIZE {
            Counters::inc(&self.counters.fragments_invalid);
            return Err(Error::Overflow);
        }

        let sequence = u16::from_le_bytes([data[1], data[2]]);
        let fragment_id = data[3] as usize;
        let total_fragments = data[4] as usize + 1;
        let max_fragments = self.config.max_fragments.min(MAX_FRAGMENTS_CAP);

        if total_fragments > max_fragments {
            Counters::inc(&self.counters.fragments_invalid);
            return Err(Error::TooManyFragments);
        }
        if fragment_id >= total_fragments {
            Counters::inc(&self.counters.fragments_invalid);
            return Err(Error::OutOfRange);
        }

        let mut body = &data[FRAGMENT_HEADER_SIZE..];
        let mut carried_header: Option<Vec<u8>> = None;
        if fragment_id == 0 {
            let (_, header_len) = match PacketHeader::read(body) {
                Ok(v) => v,
                Err(e) => {
                    Counters::inc(&self.counters.fragments_invalid);
                    return Err(e);
                }
            };
            carried_header = Some(body[..header_len].to_vec());
            body = &body[header_len..];
        }

        let is_last = fragment_id == total_fragments - 1;
        if !is_last && body.len() != self.config.fragment_size {
            Counters::inc(&self.counters.fragments_invalid);
            return Err(Error::FragmentSizeMismatch);
        }

        if !self.reassembly.exists(sequence) {
            if !self.reassembly.test_insert(sequence) {
                Counters::inc(&self.counters.fragments_invalid);
                return Err(Error::Stale);
            }
            if let Some(record) = self.reassembly.insert(sequence) {
                record.start(sequence, total_fragments, self.config.fragment_size);
            }
        }

        let record = match self.reassembly.find_mut(sequence) {
            Some(r) => r,
            None => {
                Counters::inc(&self.counters.fragments_invalid);
                return Err(Error::Stale);
            }
        };

        if record.total_fragments() != total_fragments {
            Counters::inc(&self.counters.fragments_invalid);
            return Err(Error::OutOfRange);
        }

        if record.is_duplicate(fragment_id) {
            Counters::inc(&self.counters.fragments_invalid);
            trace!(self.log, "dropping duplicate fragment"; "sequence" => sequence, "fragment_id" => fragment_id);
            return Ok(());
        }

        record.add_fragment(fragment_id, body)?;
        if let Some(header_bytes) = carried_header {
            record.set_header(&header_bytes);
        }
        Counters::inc(&self.counters.fragments_received);

        if record.is_complete() {
            let assembled = record.assembled().to_vec();
            self.reassembly.remove(sequence);
            return self.receive(&assembled);
        }

        Ok(())
    }

    /// Walks the 32 bits of `ack_bits`, marking newly-acked sent records
    /// and feeding the RTT smoother.
    fn process_acks(&mut self, ack: Sequence, ack_bits: u32) {
        let rtt_alpha = self.config.rtt_alpha;
        let ack_buffer_size = self.config.ack_buffer_size;
        let now = self.time;

        for i in 0..32u16 {
            if ack_bits & (1 << i) == 0 {
                continue;
            }
            let s = ack.wrapping_sub(i);

            if let Some(rec) = self.sent.find_mut(s) {
                if rec.acked {
                    continue;
                }
                rec.acked = true;
                let sample = (now - rec.time_sent) * 1000.0;

                Counters::inc(&self.counters.packets_acked);
                if self.ack_staging.len() < ack_buffer_size {
                    self.ack_staging.push(s);
                } else {
                    Counters::inc(&self.counters.acks_dropped);
                }

                let (rtt, initialized) = ema_update(self.rtt_ms, self.rtt_initialized, sample, rtt_alpha);
                self.rtt_ms = rtt;
                self.rtt_initialized = initialized;
            }
        }
    }

    /// Recomputes smoothed loss/bandwidth over a trailing window of
    /// `sent_size/2` (and `received_size/2`) most-recently-inserted slots.
    pub fn update(&mut self, now: f64) {
        self.time = now;

        let sent_window = (self.config.sent_size / 2).max(1);
        let (loss_sample, sent_bw_sample, acked_bw_sample) = self.sample_sent_window(sent_window);

        if let Some(loss) = loss_sample {
            let (v, i) = ema_update(self.packet_loss_pct, self.loss_initialized, loss, self.config.loss_alpha);
            self.packet_loss_pct = v;
            self.loss_initialized = i;
        }
        if let Some(bw) = sent_bw_sample {
            let (v, i) = ema_update(self.sent_bw_kbps, self.sent_bw_initialized, bw, self.config.bw_alpha);
            self.sent_bw_kbps = v;
            self.sent_bw_initialized = i;
        }
        if let Some(bw) = acked_bw_sample {
            let (v, i) = ema_update(self.acked_bw_kbps, self.acked_bw_initialized, bw, self.config.bw_alpha);
            self.acked_bw_kbps = v;
            self.acked_bw_initialized = i;
        }

        let recv_window = (self.config.received_size / 2).max(1);
        if let Some(bw) = self.sample_received_window(recv_window) {
            let (v, i) = ema_update(self.received_bw_kbps, self.received_bw_initialized, bw, self.config.bw_alpha);
            self.received_bw_kbps = v;
            self.received_bw_initialized = i;
        }
    }

    /// `(loss_fraction, sent_kbps, acked_kbps)` over the most recent
    /// `window` sent slots, read directly off the sent buffer's occupancy
    /// rather than recomputed from raw sequence arithmetic.
    fn sample_sent_window(&self, window: usize) -> (Option<f64>, Option<f64>, Option<f64>) {
        let latest_sent = self.sent.latest().wrapping_sub(1);

        let mut total = 0usize;
        let mut acked_count = 0usize;
        let mut bytes_sent = 0usize;
        let mut bytes_acked = 0usize;
        let mut min_time = f64::INFINITY;
        let mut max_time = f64::NEG_INFINITY;
        let mut acked_min_time = f64::INFINITY;
        let mut acked_max_time = f64::NEG_INFINITY;

        for i in 0..window {
            let seq = latest_sent.wrapping_sub(i as u16);
            if let Some(rec) = self.sent.find(seq) {
                total += 1;
                bytes_sent += rec.size_bytes;
                min_time = min_time.min(rec.time_sent);
                max_time = max_time.max(rec.time_sent);

                if rec.acked {
                    acked_count += 1;
                    bytes_acked += rec.size_bytes;
                    acked_min_time = acked_min_time.min(rec.time_sent);
                    acked_max_time = acked_max_time.max(rec.time_sent);
                }
            }
        }

        let loss = (total > 0).then(|| (total - acked_count) as f64 / total as f64);
        let sent_bw = (total > 0 && max_time > min_time)
            .then(|| bytes_sent as f64 * 8.0 / 1000.0 / (max_time - min_time));
        let acked_bw = (acked_count > 0 && acked_max_time > acked_min_time)
            .then(|| bytes_acked as f64 * 8.0 / 1000.0 / (acked_max_time - acked_min_time));

        (loss, sent_bw, acked_bw)
    }

    fn sample_received_window(&self, window: usize) -> Option<f64> {
        let latest_recv = self.received.latest().wrapping_sub(1);

        let mut total = 0usize;
        let mut bytes = 0usize;
        let mut min_time = f64::INFINITY;
        let mut max_time = f64::NEG_INFINITY;

        for i in 0..window {
            let seq = latest_recv.wrapping_sub(i as u16);
            if let Some(rec) = self.received.find(seq) {
                total += 1;
                bytes += rec.size_bytes;
                min_time = min_time.min(rec.time_received);
                max_time = max_time.max(rec.time_received);
            }
        }

        (total > 0 && max_time > min_time).then(|| bytes as f64 * 8.0 / 1000.0 / (max_time - min_time))
    }

    /// Clears buffers, counters and sequence state. Leaves smoothed
    /// RTT/loss/bandwidth estimates untouched: a reset typically follows a
    /// reconnect-in-place rather than a fresh peer, and discarding
    /// multi-second smoothing history on every reset would defeat the
    /// point of smoothing it in the first place.
    pub fn reset(&mut self) {
        self.sent.reset(|_| {});
        self.received.reset(|_| {});
        self.reassembly.reset(|_| {});
        self.next_sequence = 0;
        self.ack_staging.clear();
        self.counters.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging;

    #[derive(Default)]
    struct RecordingTransport {
        transmitted: Vec<Vec<u8>>,
        delivered: Vec<Vec<u8>>,
        accept: bool,
    }

    impl RecordingTransport {
        fn accepting() -> Self {
            RecordingTransport { accept: true, ..Default::default() }
        }
    }

    impl Transport for RecordingTransport {
        fn transmit(&mut self, _endpoint_id: u64, _sequence: u64, bytes: &[u8]) {
            self.transmitted.push(bytes.to_vec());
        }

        fn process_payload(&mut self, _endpoint_id: u64, _sequence: u64, bytes: &[u8]) -> bool {
            self.delivered.push(bytes.to_vec());
            self.accept
        }
    }

    fn endpoint(config: EndpointConfig) -> Endpoint<RecordingTransport> {
        Endpoint::new(1, config, RecordingTransport::accepting(), logging::discard())
    }

    #[test]
    fn send_without_fragmentation_records_sent() {
        let mut ep = endpoint(EndpointConfig::default());
        ep.send(b"hello").unwrap();
        assert_eq!(ep.counters.packets_sent(), 1);
        assert_eq!(ep.transport().transmitted.len(), 1);
        assert_eq!(ep.next_sequence(), 1);
    }

    #[test]
    fn oversize_payload_rejected() {
        let mut config = EndpointConfig::default();
        config.max_packet_size = 4;
        let mut ep = endpoint(config);
        assert_eq!(ep.send(b"hello"), Err(Error::PayloadTooLarge));
        assert_eq!(ep.counters.packets_too_large_to_send(), 1);
    }

    #[test]
    fn fragment_roundtrip_reassembles() {
        let mut config = EndpointConfig::default();
        config.fragment_threshold = 10;
        config.fragment_size = 10;
        let mut sender = endpoint(config.clone());
        let mut receiver = endpoint(config);

        let payload: Vec<u8> = (0..25u8).collect();
        sender.send(&payload).unwrap();

        let fragments = sender.transport().transmitted.clone();
        assert_eq!(fragments.len(), 3);

        for fragment in &fragments {
            receiver.receive(fragment).unwrap();
        }

        assert_eq!(receiver.transport().delivered.len(), 1);
        assert_eq!(receiver.transport().delivered[0], payload);
        assert_eq!(receiver.counters.fragments_received(), 3);
        assert_eq!(receiver.counters.packets_received(), 1);
    }

    #[test]
    fn ack_extraction_marks_acked_and_smooths_rtt() {
        let mut config = EndpointConfig::default();
        config.rtt_alpha = 0.5;
        let mut sender = endpoint(config.clone());
        let mut receiver = endpoint(config);

        sender.send(b"ping").unwrap();
        let wire = sender.transport().transmitted[0].clone();

        receiver.update(0.1);
        receiver.receive(&wire).unwrap();

        let reply = receiver.transport().transmitted.last().cloned();
        assert!(reply.is_none()); // receiver didn't send; ack piggybacks on its own next send
        receiver.send(b"pong").unwrap();
        let reply = receiver.transport().transmitted.last().unwrap().clone();

        sender.update(0.2);
        sender.receive(&reply).unwrap();

        assert_eq!(sender.counters.packets_acked(), 1);
        assert_eq!(sender.acks(), &[0]);
        assert!(sender.rtt_ms().is_some());
    }

    #[test]
    fn reset_clears_counters_but_keeps_rtt() {
        let mut ep = endpoint(EndpointConfig::default());
        ep.send(b"x").unwrap();
        ep.reset();
        assert_eq!(ep.counters.packets_sent(), 0);
        assert_eq!(ep.next_sequence(), 0);
    }
}
