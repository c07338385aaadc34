use std::io::{self, Write};

/// Most data bytes carried by one S-record.
pub const MAX_RECORD_BYTES: usize = 0x20;

/// Receives object code as it is produced by pass 2.
pub trait ObjectSink {
    fn emit(&mut self, address: u32, byte: u8) -> io::Result<()>;

    /// Records the execution start address. Only the first request counts.
    fn start(&mut self, address: u32) -> io::Result<()>;
}

/// Motorola S-record writer. Consecutive bytes are coalesced into data
/// records of up to [`MAX_RECORD_BYTES`] bytes.
#[derive(Debug)]
pub struct SRecordWriter<W: Write> {
    out: W,
    pending: Vec<u8>,
    pending_address: u32,
    started: bool,
}

impl<W: Write> SRecordWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            pending: Vec::with_capacity(MAX_RECORD_BYTES),
            pending_address: 0,
            started: false,
        }
    }

    /// Writes the `S0` record carrying the source name.
    pub fn header(&mut self, name: &str) -> io::Result<()> {
        let payload = &name.as_bytes()[..name.len().min(0xFF - 3)];
        write_record(&mut self.out, '0', &[0, 0], payload)
    }

    /// Writes any coalesced data bytes as a data record.
    pub fn flush_data(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let address = self.pending_address;
        let be = address.to_be_bytes();
        let (kind, address_bytes) = if address <= 0xFFFF {
            ('1', &be[2..])
        } else if address <= 0xFF_FFFF {
            ('2', &be[1..])
        } else {
            ('3', &be[..])
        };
        write_record(&mut self.out, kind, address_bytes, &self.pending)?;
        self.pending_address = address.wrapping_add(self.pending.len() as u32);
        self.pending.clear();
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.flush_data()?;
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> ObjectSink for SRecordWriter<W> {
    fn emit(&mut self, address: u32, byte: u8) -> io::Result<()> {
        let next = self
            .pending_address
            .wrapping_add(self.pending.len() as u32);
        if address != next || self.pending.len() >= MAX_RECORD_BYTES {
            self.flush_data()?;
            self.pending_address = address;
        }
        self.pending.push(byte);
        Ok(())
    }

    fn start(&mut self, address: u32) -> io::Result<()> {
        self.flush_data()?;
        if self.started {
            return Ok(());
        }
        self.started = true;

        let be = address.to_be_bytes();
        let (kind, address_bytes) = if address <= 0xFFFF {
            ('9', &be[2..])
        } else if address <= 0xFF_FFFF {
            ('8', &be[1..])
        } else {
            ('7', &be[..])
        };
        write_record(&mut self.out, kind, address_bytes, &[])
    }
}

/// Collects emitted bytes in memory; used by check runs and tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectImage {
    pub bytes: Vec<(u32, u8)>,
    pub start: Option<u32>,
}

impl ObjectSink for ObjectImage {
    fn emit(&mut self, address: u32, byte: u8) -> io::Result<()> {
        self.bytes.push((address, byte));
        Ok(())
    }

    fn start(&mut self, address: u32) -> io::Result<()> {
        self.start.get_or_insert(address);
        Ok(())
    }
}

fn write_record<W: Write>(
    out: &mut W,
    kind: char,
    address: &[u8],
    payload: &[u8],
) -> io::Result<()> {
    let count = (address.len() + payload.len() + 1) as u8;
    let mut sum = count;
    let mut hex = String::with_capacity(2 * (address.len() + payload.len()));
    for byte in address.iter().chain(payload) {
        sum = sum.wrapping_add(*byte);
        hex.push_str(&format!("{byte:02X}"));
    }
    write!(out, "S{kind}{count:02X}{hex}{:02X}\r\n", !sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_hex_byte(s: &str) -> u8 {
        u8::from_str_radix(s, 16).unwrap()
    }

    fn verify_checksum(line: &str) {
        assert!(line.starts_with('S'), "record must start with 'S': {line}");
        let body = &line[2..];
        let mut sum: u8 = 0;
        for idx in (0..body.len()).step_by(2) {
            sum = sum.wrapping_add(parse_hex_byte(&body[idx..idx + 2]));
        }
        assert_eq!(sum, 0xFF, "checksum mismatch for {line}");
        assert_eq!(
            parse_hex_byte(&body[..2]) as usize * 2,
            body.len() - 2,
            "count mismatch for {line}"
        );
    }

    fn records(writer: SRecordWriter<Vec<u8>>) -> Vec<String> {
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert!(text.ends_with("\r\n"));
        text.split_terminator("\r\n").map(str::to_string).collect()
    }

    #[test]
    fn header_record_carries_the_name() {
        let mut writer = SRecordWriter::new(Vec::new());
        writer.header("input.s").unwrap();
        assert_eq!(records(writer), vec!["S00A0000696E7075742E7324"]);
    }

    #[test]
    fn coalesces_consecutive_bytes_and_splits_on_gaps() {
        let mut writer = SRecordWriter::new(Vec::new());
        for (offset, byte) in [0x00u8, 0x22, 0x18, 0x00].into_iter().enumerate() {
            writer.emit(0x1000 + offset as u32, byte).unwrap();
        }
        writer.emit(0x2000, 0xAA).unwrap();
        writer.start(0x1000).unwrap();

        let lines = records(writer);
        assert_eq!(
            lines,
            vec!["S107100000221800AE", "S1042000AA31", "S9031000EC"]
        );
        for line in &lines {
            verify_checksum(line);
        }
    }

    #[test]
    fn data_records_hold_at_most_32_bytes() {
        let mut writer = SRecordWriter::new(Vec::new());
        for offset in 0..40u32 {
            writer.emit(offset, offset as u8).unwrap();
        }
        let lines = records(writer);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("S1230000"));
        assert!(lines[1].starts_with("S10B0020"));
        for line in &lines {
            verify_checksum(line);
        }
    }

    #[test]
    fn only_the_first_start_request_is_written() {
        let mut writer = SRecordWriter::new(Vec::new());
        writer.start(0x12_3456).unwrap();
        writer.start(0).unwrap();
        let lines = records(writer);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("S804123456"));
        verify_checksum(&lines[0]);
    }

    #[test]
    fn wide_addresses_use_longer_records() {
        let mut writer = SRecordWriter::new(Vec::new());
        writer.emit(0x0001_0000, 0x11).unwrap();
        writer.emit(0x0100_0000, 0x22).unwrap();
        writer.start(0x0100_0000).unwrap();
        let lines = records(writer);
        assert!(lines[0].starts_with("S20501000011"));
        assert!(lines[1].starts_with("S3060100000022"));
        assert!(lines[2].starts_with("S70501000000"));
        for line in &lines {
            verify_checksum(line);
        }
    }
}
