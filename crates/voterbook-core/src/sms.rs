//! SMS campaign drafts. Builds the recipient list and segment estimate;
//! nothing here sends messages.

use std::collections::HashSet;
use std::io::Write;

use serde::Serialize;

use crate::models::VoterData;
use crate::utils::normalize_bd_mobile;

/// GSM 03.38 basic character set.
const GSM7_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

/// Characters sent as an escape plus one septet.
const GSM7_EXTENDED: &str = "^{}\\[~]|€\x0c";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SmsEncoding {
    Gsm7,
    Ucs2,
}

impl SmsEncoding {
    /// Units per single message, and per part of a multipart message.
    fn limits(&self) -> (usize, usize) {
        match self {
            SmsEncoding::Gsm7 => (160, 153),
            SmsEncoding::Ucs2 => (70, 67),
        }
    }
}

impl std::fmt::Display for SmsEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmsEncoding::Gsm7 => write!(f, "GSM-7"),
            SmsEncoding::Ucs2 => write!(f, "UCS-2"),
        }
    }
}

/// Encoding and length of `message` in that encoding's units
/// (septets for GSM-7, UTF-16 code units for UCS-2).
pub fn measure(message: &str) -> (SmsEncoding, usize) {
    let mut septets = 0;
    for c in message.chars() {
        if GSM7_BASIC.contains(c) {
            septets += 1;
        } else if GSM7_EXTENDED.contains(c) {
            septets += 2;
        } else {
            return (SmsEncoding::Ucs2, message.encode_utf16().count());
        }
    }
    (SmsEncoding::Gsm7, septets)
}

pub fn segment_count(encoding: SmsEncoding, units: usize) -> usize {
    let (single, part) = encoding.limits();
    match units {
        0 => 0,
        n if n <= single => 1,
        n => n.div_ceil(part),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub voter_id: String,
    pub name: String,
    /// `+8801XXXXXXXXX`
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedVoter {
    pub voter_id: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SmsCampaign {
    pub message: String,
    pub encoding: SmsEncoding,
    pub units: usize,
    pub segments: usize,
    pub recipients: Vec<Recipient>,
    pub skipped: Vec<SkippedVoter>,
}

impl SmsCampaign {
    /// Build a draft for `voters`. The phone number is used, falling back
    /// to WhatsApp. Numbers already on the list are skipped as duplicates.
    pub fn draft(message: &str, voters: &[VoterData]) -> Self {
        let (encoding, units) = measure(message);
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();
        let mut skipped = Vec::new();

        for voter in voters {
            let raw = voter.phone.as_deref().or(voter.whatsapp.as_deref());
            let skip = |reason: String| SkippedVoter {
                voter_id: voter.id.clone(),
                name: voter.voter_name.clone(),
                reason,
            };
            let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
                skipped.push(skip("No phone number".to_string()));
                continue;
            };
            let Some(number) = normalize_bd_mobile(raw) else {
                skipped.push(skip(format!("Invalid number '{}'", raw)));
                continue;
            };
            if !seen.insert(number.clone()) {
                skipped.push(skip(format!("Duplicate of {}", number)));
                continue;
            }
            recipients.push(Recipient {
                voter_id: voter.id.clone(),
                name: voter.voter_name.clone(),
                number,
            });
        }

        SmsCampaign {
            message: message.to_string(),
            encoding,
            units,
            segments: segment_count(encoding, units),
            recipients,
            skipped,
        }
    }

    /// Messages billed for the whole campaign.
    pub fn total_segments(&self) -> usize {
        self.segments * self.recipients.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} recipients, {} skipped, {} {} segment(s) each, {} total",
            self.recipients.len(),
            self.skipped.len(),
            self.segments,
            self.encoding,
            self.total_segments()
        )
    }

    /// Recipient list as `Name,Number` CSV for a bulk SMS gateway.
    pub fn write_recipients<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(["Name", "Number"])?;
        for r in &self.recipients {
            csv_writer.write_record([r.name.as_str(), r.number.as_str()])?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationPath;

    fn voter(id: &str, phone: Option<&str>) -> VoterData {
        let mut v = VoterData::new(format!("Voter {}", id), LocationPath::default());
        v.id = id.to_string();
        v.phone = phone.map(str::to_string);
        v
    }

    #[test]
    fn test_measure_gsm_and_ucs2() {
        assert_eq!(measure("Vote on Friday!"), (SmsEncoding::Gsm7, 15));
        assert_eq!(measure("Price: 10€"), (SmsEncoding::Gsm7, 11));
        assert_eq!(measure("ভোট দিন"), (SmsEncoding::Ucs2, 7));
    }

    #[test]
    fn test_segment_count() {
        assert_eq!(segment_count(SmsEncoding::Gsm7, 0), 0);
        assert_eq!(segment_count(SmsEncoding::Gsm7, 160), 1);
        assert_eq!(segment_count(SmsEncoding::Gsm7, 161), 2);
        assert_eq!(segment_count(SmsEncoding::Gsm7, 306), 2);
        assert_eq!(segment_count(SmsEncoding::Gsm7, 307), 3);
        assert_eq!(segment_count(SmsEncoding::Ucs2, 70), 1);
        assert_eq!(segment_count(SmsEncoding::Ucs2, 71), 2);
        assert_eq!(segment_count(SmsEncoding::Ucs2, 135), 3);
    }

    #[test]
    fn test_draft_normalizes_and_dedupes() {
        let mut wa = voter("5", None);
        wa.whatsapp = Some("01911000000".into());
        let voters = vec![
            voter("1", Some("01712-345678")),
            voter("2", Some("+8801712345678")),
            voter("3", Some("12345")),
            voter("4", None),
            wa,
        ];
        let campaign = SmsCampaign::draft(&"ভ".repeat(71), &voters);
        assert_eq!(campaign.encoding, SmsEncoding::Ucs2);
        assert_eq!(campaign.segments, 2);
        assert_eq!(
            campaign.recipients.iter().map(|r| r.number.as_str()).collect::<Vec<_>>(),
            vec!["+8801712345678", "+8801911000000"]
        );
        let skipped: Vec<_> = campaign.skipped.iter().map(|s| s.voter_id.as_str()).collect();
        assert_eq!(skipped, vec!["2", "3", "4"]);
        assert!(campaign.skipped[0].reason.starts_with("Duplicate"));
        assert_eq!(campaign.total_segments(), 4);
    }

    #[test]
    fn test_write_recipients() {
        let campaign = SmsCampaign::draft("hi", &[voter("1", Some("01812000000"))]);
        let mut buf = Vec::new();
        campaign.write_recipients(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Name,Number\nVoter 1,+8801812000000\n");
    }
}
