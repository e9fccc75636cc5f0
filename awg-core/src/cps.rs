//! Configured Packet Structure (CPS) templates: a small tag language for
//! describing synthetic decoy packets, parsed once at startup and
//! materialized on demand on the hot path.

use rand_core::RngCore;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CpsError {
    #[error("empty CPS template")]
    Empty,
    #[error("unterminated tag starting at byte {0}")]
    UnterminatedTag(usize),
    #[error("unknown tag kind {0:?}")]
    UnknownTag(String),
    #[error("tag {0:?} is missing its size argument")]
    MissingSize(String),
    #[error("tag {0:?} size argument {1:?} is not a positive integer")]
    InvalidSize(String, String),
    #[error("static byte tag has an odd-length hex string {0:?}")]
    OddLengthHex(String),
    #[error("static byte tag contains non-hex characters {0:?}")]
    InvalidHex(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(Vec<u8>),
    Random(usize),
    RandomAlnum(usize),
    RandomDecimal(usize),
    Timestamp,
    Counter,
}

/// A parsed CPS template. `generate` materializes one packet from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpsTemplate {
    segments: Vec<Segment>,
}

const ALNUM: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const DECIMAL: &[u8] = b"0123456789";

impl CpsTemplate {
    /// Parses a template string of whitespace-separated, angle-bracketed
    /// tags.
    pub fn parse(src: &str) -> Result<Self, CpsError> {
        let mut segments = Vec::new();
        let bytes = src.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i].is_ascii_whitespace() {
                i += 1;
                continue;
            }
            if bytes[i] != b'<' {
                // Tolerate stray characters outside tags the same way a
                // malformed tag would be rejected: treat it as an unknown tag.
                let end = src[i..].find('<').map(|o| i + o).unwrap_or(src.len());
                return Err(CpsError::UnknownTag(src[i..end].trim().to_string()));
            }
            let close = src[i..]
                .find('>')
                .map(|o| i + o)
                .ok_or(CpsError::UnterminatedTag(i))?;
            let inner = src[i + 1..close].trim();
            segments.push(parse_tag(inner)?);
            i = close + 1;
        }

        if segments.is_empty() {
            return Err(CpsError::Empty);
        }

        Ok(Self { segments })
    }

    /// Generates one packet. `<t>` reads the wall clock now; `<c>` embeds
    /// `counter` verbatim (the caller is responsible for incrementing it
    /// between packets — see `GenerateCPSPackets` in transform/session code).
    pub fn generate(&self, counter: u32, now_unix_secs: u32, rng: &mut impl RngCore) -> Vec<u8> {
        let mut out = Vec::new();
        for seg in &self.segments {
            match seg {
                Segment::Static(bytes) => out.extend_from_slice(bytes),
                Segment::Random(n) => {
                    let start = out.len();
                    out.resize(start + n, 0);
                    rng.fill_bytes(&mut out[start..]);
                }
                Segment::RandomAlnum(n) => {
                    for _ in 0..*n {
                        let idx = (rng.next_u32() as usize) % ALNUM.len();
                        out.push(ALNUM[idx]);
                    }
                }
                Segment::RandomDecimal(n) => {
                    for _ in 0..*n {
                        let idx = (rng.next_u32() as usize) % DECIMAL.len();
                        out.push(DECIMAL[idx]);
                    }
                }
                Segment::Timestamp => out.extend_from_slice(&now_unix_secs.to_le_bytes()),
                Segment::Counter => out.extend_from_slice(&counter.to_le_bytes()),
            }
        }
        out
    }
}

fn parse_tag(inner: &str) -> Result<Segment, CpsError> {
    let mut parts = inner.splitn(2, char::is_whitespace);
    let kind = parts.next().unwrap_or("");
    let arg = parts.next().map(str::trim).unwrap_or("");

    match kind {
        "b" => {
            let hex = arg.strip_prefix("0x").or(arg.strip_prefix("0X")).unwrap_or(arg);
            if hex.len() % 2 != 0 {
                return Err(CpsError::OddLengthHex(inner.to_string()));
            }
            let mut bytes = Vec::with_capacity(hex.len() / 2);
            let hex_bytes = hex.as_bytes();
            let mut i = 0;
            while i < hex_bytes.len() {
                let hi = hex_digit(hex_bytes[i]).ok_or_else(|| CpsError::InvalidHex(inner.to_string()))?;
                let lo = hex_digit(hex_bytes[i + 1]).ok_or_else(|| CpsError::InvalidHex(inner.to_string()))?;
                bytes.push((hi << 4) | lo);
                i += 2;
            }
            Ok(Segment::Static(bytes))
        }
        "r" => Ok(Segment::Random(parse_size(kind, arg)?)),
        "rc" => Ok(Segment::RandomAlnum(parse_size(kind, arg)?)),
        "rd" => Ok(Segment::RandomDecimal(parse_size(kind, arg)?)),
        "t" => Ok(Segment::Timestamp),
        "c" => Ok(Segment::Counter),
        other => Err(CpsError::UnknownTag(other.to_string())),
    }
}

fn parse_size(kind: &str, arg: &str) -> Result<usize, CpsError> {
    if arg.is_empty() {
        return Err(CpsError::MissingSize(kind.to_string()));
    }
    arg.parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| CpsError::InvalidSize(kind.to_string(), arg.to_string()))
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Walks the five template slots in order, generating one packet per
/// configured template using the counter's current value, then
/// post-incrementing it: the first CPS packet observes counter 0, the
/// second observes 1, and so on.
pub fn generate_cps_packets(
    templates: &[Option<CpsTemplate>; 5],
    counter: &mut u32,
    now_unix_secs: u32,
    rng: &mut impl RngCore,
) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    for template in templates {
        if let Some(template) = template {
            out.push(template.generate(*counter, now_unix_secs, rng));
            *counter = counter.wrapping_add(1);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn static_hex_tag() {
        let t = CpsTemplate::parse("<b 0xDEAD>").unwrap();
        assert_eq!(t.generate(0, 0, &mut OsRng), vec![0xDE, 0xAD]);
    }

    #[test]
    fn counter_tag_is_little_endian_and_not_self_incrementing() {
        let t = CpsTemplate::parse("<c>").unwrap();
        assert_eq!(t.generate(1, 0, &mut OsRng), vec![1, 0, 0, 0]);
        // generate() alone never mutates counter; only the walker does.
        assert_eq!(t.generate(1, 0, &mut OsRng), vec![1, 0, 0, 0]);
    }

    #[test]
    fn timestamp_tag_is_little_endian_four_bytes() {
        let t = CpsTemplate::parse("<t>").unwrap();
        assert_eq!(t.generate(0, 0x0102_0304, &mut OsRng), vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn random_tags_have_correct_length_and_alphabet() {
        let t = CpsTemplate::parse("<r 5><rc 4><rd 3>").unwrap();
        let out = t.generate(0, 0, &mut OsRng);
        assert_eq!(out.len(), 12);
        for &b in &out[5..9] {
            assert!(b.is_ascii_alphanumeric());
        }
        for &b in &out[9..12] {
            assert!(b.is_ascii_digit());
        }
    }

    #[test]
    fn whitespace_between_tags_is_ignored() {
        let a = CpsTemplate::parse("<b 0xAA>  <b 0xBB>").unwrap();
        let b = CpsTemplate::parse("<b 0xAA><b 0xBB>").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_template_is_an_error() {
        assert_eq!(CpsTemplate::parse(""), Err(CpsError::Empty));
        assert_eq!(CpsTemplate::parse("   "), Err(CpsError::Empty));
    }

    #[test]
    fn unknown_tag_is_an_error() {
        assert!(matches!(CpsTemplate::parse("<zz 4>"), Err(CpsError::UnknownTag(_))));
    }

    #[test]
    fn odd_length_hex_is_an_error() {
        assert!(matches!(
            CpsTemplate::parse("<b 0xABC>"),
            Err(CpsError::OddLengthHex(_))
        ));
    }

    #[test]
    fn unterminated_tag_is_an_error() {
        assert!(matches!(
            CpsTemplate::parse("<r 4"),
            Err(CpsError::UnterminatedTag(_))
        ));
    }

    #[test]
    fn cps_ordering_matches_scenario_s5() {
        let templates: [Option<CpsTemplate>; 5] = [
            Some(CpsTemplate::parse("<b 0xDEAD>").unwrap()),
            None,
            Some(CpsTemplate::parse("<c>").unwrap()),
            None,
            None,
        ];
        let mut counter = 0u32;
        let packets = generate_cps_packets(&templates, &mut counter, 0, &mut OsRng);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0], vec![0xDE, 0xAD]);
        assert_eq!(packets[1], vec![1, 0, 0, 0]);
        assert_eq!(counter, 2);
    }
}
