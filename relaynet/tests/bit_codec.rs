//! Exercises the bit codec and the `Stream` abstraction together, the way
//! `token.rs` and `header.rs` actually use them: mixed-width integers, byte
//! blocks, alignment and the measure mode agreeing with what the write
//! mode actually emits.

use relaynet::stream::Stream;

#[test]
fn measure_mode_matches_actual_write_size_for_mixed_fields() {
    let mut measure = Stream::measure();
    let mut a = 12i64;
    let mut b = 200u32;
    measure.int(&mut a, 0, 255).unwrap();
    measure.bits(&mut b, 10).unwrap();
    measure.align().unwrap();
    let mut payload = [0u8; 4];
    measure.bytes(&mut payload).unwrap();

    let measured_bytes = (measure.measured_bits() + 7) / 8;

    let mut writer = Stream::writer(measured_bytes + 4);
    let mut a = 12i64;
    let mut b = 200u32;
    writer.int(&mut a, 0, 255).unwrap();
    writer.bits(&mut b, 10).unwrap();
    writer.align().unwrap();
    let mut payload = [9u8, 8, 7, 6];
    writer.bytes(&mut payload).unwrap();
    let bytes = writer.into_write_bytes();

    // Measure mode charges 7 bits for an align regardless of how many
    // padding bits an actual write needs, so it's only ever an upper bound.
    assert!(bytes.len() <= measured_bytes);
}

#[test]
fn round_trips_a_sequence_of_heterogeneous_fields() {
    let mut writer = Stream::writer(64);
    let mut small = 3i64;
    let mut large = 70_000i64;
    let mut flag = 1u32;
    writer.int(&mut small, 0, 7).unwrap();
    writer.int(&mut large, 0, 100_000).unwrap();
    writer.bits(&mut flag, 1).unwrap();
    writer.align().unwrap();
    let mut block = *b"payload!";
    writer.bytes(&mut block).unwrap();
    writer.check().unwrap();
    let bytes = writer.into_write_bytes();

    let mut reader = Stream::reader(&bytes);
    let mut small_out = 0i64;
    let mut large_out = 0i64;
    let mut flag_out = 0u32;
    reader.int(&mut small_out, 0, 7).unwrap();
    reader.int(&mut large_out, 0, 100_000).unwrap();
    reader.bits(&mut flag_out, 1).unwrap();
    reader.align().unwrap();
    let mut block_out = [0u8; 8];
    reader.bytes(&mut block_out).unwrap();
    reader.check().unwrap();

    assert_eq!(small_out, 3);
    assert_eq!(large_out, 70_000);
    assert_eq!(flag_out, 1);
    assert_eq!(&block_out, b"payload!");
}

#[test]
fn int_rejects_value_outside_declared_range_on_read() {
    // Same bit width on both ends (bits_required(0, 15) == bits_required(0,
    // 8) == 4), so the raw bits decode cleanly to 9, then get rejected
    // because 9 falls outside the reader's declared 0..=8.
    let mut writer = Stream::writer(4);
    let mut v = 9i64;
    writer.int(&mut v, 0, 15).unwrap();
    let bytes = writer.into_write_bytes();

    let mut reader = Stream::reader(&bytes);
    let mut out = 0i64;
    assert_eq!(reader.int(&mut out, 0, 8), Err(relaynet::error::Error::OutOfRange));
}
