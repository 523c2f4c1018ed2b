//! CSV export and the printable HTML report.

use std::io::Write;

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::hierarchy::LocationHierarchy;
use crate::models::{LocationLevel, VoterData, VoterField};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown field: {0}")]
    UnknownField(String),
}

/// Parse a comma-separated field list such as `voter_name,age,district`.
/// An empty list selects the default columns.
pub fn parse_field_list(list: &str) -> Result<Vec<VoterField>, ExportError> {
    let names: Vec<&str> = list.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if names.is_empty() {
        return Ok(VoterField::DEFAULT_EXPORT.to_vec());
    }
    names
        .into_iter()
        .map(|name| VoterField::parse(name).ok_or_else(|| ExportError::UnknownField(name.to_string())))
        .collect()
}

/// Cell text for `field`. Location columns show names when a hierarchy
/// is available and ids otherwise.
pub fn cell_text(voter: &VoterData, field: VoterField, hierarchy: Option<&LocationHierarchy>) -> String {
    match (field.location_level(), hierarchy) {
        (Some(level), Some(h)) => voter
            .location
            .get(level)
            .map(|id| h.name_of(level, id).unwrap_or(id).to_string())
            .unwrap_or_default(),
        _ => field.text(voter).unwrap_or_default(),
    }
}

/// Like `cell_text`, but a location name shared by siblings is written
/// as its id so the importer resolves it to the same node.
fn csv_cell(voter: &VoterData, field: VoterField, hierarchy: Option<&LocationHierarchy>) -> String {
    match (field.location_level(), hierarchy) {
        (Some(level), Some(h)) => voter
            .location
            .get(level)
            .map(|id| h.export_label(level, id).to_string())
            .unwrap_or_default(),
        _ => field.text(voter).unwrap_or_default(),
    }
}

/// The columns a CSV export actually writes: `Voter Name` first when the
/// selection leaves it out, and every ancestor of a chosen location column
/// ahead of it, so the file can be imported back.
pub fn importable_fields(fields: &[VoterField]) -> Vec<VoterField> {
    let mut columns = Vec::with_capacity(fields.len() + 1);
    if !fields.contains(&VoterField::VoterName) {
        columns.push(VoterField::VoterName);
    }
    for &field in fields {
        if let Some(level) = field.location_level() {
            for ancestor in LocationLevel::ALL.into_iter().take_while(|l| *l != level) {
                let column = VoterField::for_level(ancestor);
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
        }
        if !columns.contains(&field) {
            columns.push(field);
        }
    }
    columns
}

/// Write `voters` as CSV with the import headers for `fields`, widened by
/// `importable_fields`.
pub fn write_csv<W: Write>(
    writer: W,
    voters: &[VoterData],
    fields: &[VoterField],
    hierarchy: Option<&LocationHierarchy>,
) -> Result<(), ExportError> {
    let columns = importable_fields(fields);
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(columns.iter().map(|f| f.header()))?;
    for voter in voters {
        csv_writer.write_record(columns.iter().map(|f| csv_cell(voter, *f, hierarchy)))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn to_csv_string(
    voters: &[VoterData],
    fields: &[VoterField],
    hierarchy: Option<&LocationHierarchy>,
) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_csv(&mut buf, voters, fields, hierarchy)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const REPORT_STYLE: &str = "body{font-family:'Noto Sans Bengali','Segoe UI',sans-serif;margin:24px;color:#222}\
h1{font-size:20px;margin:0 0 4px}\
.meta{color:#555;font-size:12px;margin-bottom:16px}\
table{border-collapse:collapse;width:100%;font-size:12px}\
th,td{border:1px solid #999;padding:4px 6px;text-align:left}\
th{background:#eee}\
tr:nth-child(even) td{background:#fafafa}\
@media print{body{margin:0}}";

/// A printable report: self-contained HTML meant for the browser's
/// print-to-PDF.
pub struct Report<'a> {
    pub title: &'a str,
    pub filter_summary: &'a str,
    pub generated_at: DateTime<Local>,
    pub fields: &'a [VoterField],
    pub hierarchy: Option<&'a LocationHierarchy>,
}

impl Report<'_> {
    pub fn render(&self, voters: &[VoterData]) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"bn\">\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str(&format!("<title>{}</title>\n", escape_html(self.title)));
        html.push_str(&format!("<style>{}</style>\n</head>\n<body>\n", REPORT_STYLE));
        html.push_str(&format!("<h1>{}</h1>\n", escape_html(self.title)));
        html.push_str(&format!(
            "<div class=\"meta\">{} &middot; {} voters &middot; generated {}</div>\n",
            escape_html(self.filter_summary),
            voters.len(),
            self.generated_at.format("%Y-%m-%d %H:%M"),
        ));

        html.push_str("<table>\n<thead><tr><th>#</th>");
        for field in self.fields {
            html.push_str(&format!("<th>{}</th>", escape_html(field.header())));
        }
        html.push_str("</tr></thead>\n<tbody>\n");
        for (i, voter) in voters.iter().enumerate() {
            html.push_str(&format!("<tr><td>{}</td>", i + 1));
            for field in self.fields {
                let text = cell_text(voter, *field, self.hierarchy);
                html.push_str(&format!("<td>{}</td>", escape_html(&text)));
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::test_support::sample;
    use crate::import::parse_csv;
    use crate::models::LocationPath;

    fn voters() -> Vec<VoterData> {
        let mut a = VoterData::new("Rahim, \"Babu\" Uddin", LocationPath::from_ids(&["6", "47", "367", "3701"]));
        a.age = Some(52);
        a.phone = Some("01712345678".into());
        a.needs_transport = Some(true);
        a.voting_intent = Some("Undecided".into());
        let mut b = VoterData::new("Salma Khatun", LocationPath::from_ids(&["6", "41", "330"]));
        b.gender = Some("Female".into());
        b.needs_transport = Some(false);
        vec![a, b]
    }

    #[test]
    fn test_parse_field_list() {
        assert_eq!(parse_field_list("").unwrap(), VoterField::DEFAULT_EXPORT.to_vec());
        assert_eq!(
            parse_field_list("voter_name, age ,district").unwrap(),
            vec![VoterField::VoterName, VoterField::Age, VoterField::District]
        );
        assert!(matches!(parse_field_list("voter_name,shoe"), Err(ExportError::UnknownField(f)) if f == "shoe"));
    }

    #[test]
    fn test_export_reimports_same_values() {
        let hierarchy = sample();
        let fields = [
            VoterField::VoterName,
            VoterField::Age,
            VoterField::Gender,
            VoterField::Phone,
            VoterField::VotingIntent,
            VoterField::NeedsTransport,
            VoterField::Division,
            VoterField::District,
            VoterField::Upazila,
            VoterField::Union,
        ];
        let original = voters();
        let csv = to_csv_string(&original, &fields, Some(&hierarchy)).unwrap();
        assert!(csv.starts_with("Voter Name,Age,Gender,Phone,Voting Intent,Needs Transport,Division"));

        let plan = parse_csv(csv.as_bytes(), Some(&hierarchy), &LocationPath::default()).unwrap();
        assert!(plan.is_valid(), "{:?}", plan.errors);
        assert_eq!(plan.rows.len(), original.len());
        for (row, voter) in plan.rows.iter().zip(&original) {
            for field in fields {
                assert_eq!(field.text(&row.voter), field.text(voter), "{}", field);
            }
        }
    }

    #[test]
    fn test_location_ids_without_hierarchy() {
        let csv = to_csv_string(&voters(), &[VoterField::District], None).unwrap();
        assert_eq!(csv, "Voter Name,Division,District\n\"Rahim, \"\"Babu\"\" Uddin\",6,47\nSalma Khatun,6,41\n");
    }

    #[test]
    fn test_importable_fields_adds_name_and_ancestors() {
        assert_eq!(
            importable_fields(&[VoterField::Age, VoterField::Upazila]),
            vec![
                VoterField::VoterName,
                VoterField::Age,
                VoterField::Division,
                VoterField::District,
                VoterField::Upazila,
            ]
        );
        let full = VoterField::DEFAULT_EXPORT.to_vec();
        assert_eq!(importable_fields(&full), full);
    }

    #[test]
    fn test_field_subset_reimports() {
        let hierarchy = sample();
        let csv = to_csv_string(&voters(), &[VoterField::Age, VoterField::Upazila], Some(&hierarchy)).unwrap();
        assert!(csv.starts_with("Voter Name,Age,Division,District,Upazila\n"));

        let plan = parse_csv(csv.as_bytes(), Some(&hierarchy), &LocationPath::default()).unwrap();
        assert!(plan.is_valid(), "{:?}", plan.errors);
        assert_eq!(plan.rows[0].voter.age, Some(52));
        assert_eq!(plan.rows[0].voter.location, LocationPath::from_ids(&["6", "47", "367"]));
        assert_eq!(plan.rows[1].voter.location, LocationPath::from_ids(&["6", "41", "330"]));
    }

    #[test]
    fn test_shared_village_name_round_trips_by_id() {
        let hierarchy = sample();
        let voters = vec![
            VoterData::new("Karim", LocationPath::from_ids(&["6", "47", "367", "3702", "90005"])),
            VoterData::new("Rina", LocationPath::from_ids(&["6", "47", "367", "3702", "90003"])),
        ];
        let csv = to_csv_string(&voters, &[VoterField::VoterName, VoterField::Village], Some(&hierarchy)).unwrap();
        assert!(csv.contains("Karim,Dhaka,Dhaka,Dhamrai,Sombhag,90005\n"));
        assert!(csv.contains("Rina,Dhaka,Dhaka,Dhamrai,Sombhag,Sombhag Para\n"));

        let plan = parse_csv(csv.as_bytes(), Some(&hierarchy), &LocationPath::default()).unwrap();
        assert!(plan.is_valid(), "{:?}", plan.errors);
        for (row, voter) in plan.rows.iter().zip(&voters) {
            assert_eq!(row.voter.location, voter.location);
        }
    }

    #[test]
    fn test_report_escapes_cells() {
        let mut list = voters();
        list[1].voter_name = "<script>alert(1)</script>".into();
        let report = Report {
            title: "Voters & Supporters",
            filter_summary: "Dhaka › Dhaka",
            generated_at: Local::now(),
            fields: &[VoterField::VoterName, VoterField::Upazila],
            hierarchy: Some(&sample()),
        };
        let html = report.render(&list);
        assert!(html.contains("<title>Voters &amp; Supporters</title>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("<td>Dhamrai</td>"));
        assert!(html.contains("2 voters"));
    }
}
