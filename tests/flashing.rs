use max1464::format::{self, EOF_RECORD};
use max1464::transport::TraceTransport;
use max1464::{InterfaceMode, Max1464, Partition};

fn image() -> Vec<u8> {
    (0..0x80u16).map(|i| (i * 7 + 3) as u8).collect()
}

#[test]
fn program_then_dump_partition_1() {
    let image = image();
    let lines = format::binary_to_ihex(&image);

    let mut chip = Max1464::new(TraceTransport::new());
    chip.enable_4wire_mode().unwrap();
    chip.flash_hex_lines(Partition::Partition1, &lines).unwrap();
    assert!(chip.has_eof_been_reached());

    let sent = chip.transport_mut().take_sent();
    // IMR, halt, 3 x (DHR + 2 raw), select partition 1, erase
    assert_eq!(sent.len(), 1 + 1 + 18 + 2 + image.len() * 7);
    assert_eq!(&sent[..2], &[0x09, 0x78]);
    assert_eq!(&sent[20..22], &[0xf8, 0xe8]);

    // the chip answers with the programmed bytes, upper byte undefined
    chip.transport_mut()
        .queue_replies(image.iter().map(|&b| 0x5a00 | b as u16));
    let mut dump = Vec::new();
    chip.read_flash_partition(Partition::Partition1, &mut dump)
        .unwrap();
    let text = String::from_utf8(dump).unwrap();
    assert_eq!(text.lines().count(), 9);
    assert_eq!(text.lines().last(), Some(EOF_RECORD));
    assert_eq!(format::read_ihex(&text).unwrap(), image);

    chip.transport_mut().queue_replies(image.iter().map(|&b| b as u16));
    chip.verify_flash_partition(Partition::Partition1, &image)
        .unwrap();
}

#[test]
fn verify_reports_mismatch() {
    let image = image();
    let mut chip = Max1464::new(TraceTransport::new().with_idle_word(0x00ff));
    chip.enable_4wire_mode().unwrap();
    chip.transport_mut().queue_replies(image.iter().map(|&b| b as u16));
    let mut bad = image.clone();
    bad[0x42] ^= 0x01;
    let err = chip
        .verify_flash_partition(Partition::Partition1, &bad)
        .unwrap_err();
    assert!(err.to_string().contains("0x0042"), "{}", err);
}

#[test]
fn unterminated_stream_is_an_error() {
    let mut lines = format::binary_to_ihex(&[0x11, 0x22]);
    lines.pop();
    let mut chip = Max1464::new(TraceTransport::new());
    assert!(
        chip.flash_hex_lines(Partition::Partition0, &lines)
            .is_err()
    );
}

#[test]
fn rejected_line_stops_programming() {
    let lines = [":0100000042BD", ":0100010043BA", EOF_RECORD];
    let mut chip = Max1464::new(TraceTransport::new());
    let err = chip
        .flash_hex_lines(Partition::Partition0, &lines)
        .unwrap_err();
    assert!(err.to_string().contains("line 2"), "{}", err);
    assert!(!chip.has_eof_been_reached());
}

#[test]
fn three_wire_reads_rearm_output() {
    let mut chip = Max1464::new(TraceTransport::new());
    assert_eq!(chip.interface_mode(), InterfaceMode::ThreeWire);
    chip.transport_mut().queue_reply(0x0123);
    assert_eq!(chip.read_cpu_program_counter().unwrap(), 0x0123);
    // CR_READ16_CPU_PC, then IMR_3WIRE before the read
    assert_eq!(chip.transport().sent(), &[0x68, 0x19]);
}
