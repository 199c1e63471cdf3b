/// Hexdump an image with its load addresses and an ASCII column.
///
/// Runs of identical full rows are collapsed into a single `*` line.
pub fn hexdump(image: &[u8], start: u16, stride: usize) -> String {
    let mut str = String::new();
    let mut previous: Option<&[u8]> = None;
    let mut skipping = false;

    for (ix, row) in image.chunks(stride).enumerate() {
        if previous == Some(row) && row.len() == stride {
            if !skipping {
                str.push_str("*\n");
                skipping = true;
            }
            continue;
        }
        skipping = false;
        previous = Some(row);

        str.push_str(format!("{:04x}:", start as usize + ix * stride).as_str());
        for byte in row {
            str.push_str(format!(" {:02x}", byte).as_str());
        }
        for _ in row.len()..stride {
            str.push_str("   ");
        }
        str.push_str("  ");
        str.extend(row.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        str.push('\n');
    }

    str
}

/// Hexdump an image as little-endian words, like Linux `hexdump` without options
pub fn hexdump_words(image: &[u8], addr_width: usize, stride: usize) -> String {
    let mut str = String::new();

    for (ix, row) in image.chunks(stride).enumerate() {
        str.push_str(format!("{:0width$x}", ix * stride, width = addr_width).as_str());
        for pair in row.chunks(2) {
            let word = u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]);
            str.push_str(format!(" {:04x}", word).as_str());
        }
        str.push('\n');
    }
    str.push_str(format!("{:0width$x}", image.len(), width = addr_width).as_str());

    str
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_hexdump() {
        let image = vec![0x3E, 0x06, 0xD7, 0xED, 0x5E, 0x21, 0x48, 0x69, 0xC9];
        assert_eq!(
            hexdump(&image, 0x8000, 8),
            "8000: 3e 06 d7 ed 5e 21 48 69  >...^!Hi
8008: c9                       .
"
        );
    }

    #[test]
    fn test_hexdump_repeated_rows() {
        let mut image = vec![0; 24];
        image.push(b'A');
        assert_eq!(
            hexdump(&image, 0x8000, 8),
            "8000: 00 00 00 00 00 00 00 00  ........
*
8018: 41                       A
"
        );
    }

    #[test]
    fn test_hexdump_words() {
        let image = vec![
            0x3E, 0x06, 0xD7, 0xED, 0x5E, 0xED, 0x8A, 0x12, 0x34, 0xCB, 0x5F, 0xCD, 0x06, 0x80,
            0x03, 0x03, 0x80, 0xC9, 0x18, 0x7F, 0x00,
        ];
        assert_eq!(
            hexdump_words(&image, 7, 16),
            "0000000 063e edd7 ed5e 128a cb34 cd5f 8006 0303
0000010 c980 7f18 0000
0000015"
        );
    }
}
