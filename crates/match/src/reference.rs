use std::sync::OnceLock;

use regex::Regex;
use tally_core::Transaction;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// DH-202512-10218, INV-2025-042
re!(re_coded_number, r"[A-Z]{2,}-\d[\d-]+\d");
// Nr. 12345, nr 12345
re!(re_number_label, r"[Nn]r\.?\s*(\S+)");
// rēķins Nr. 77, rēķinu nr 2025/14
re!(re_invoice_lv, r"[Rr]ēķin\S*\s+\S*\s*(\S+)");

/// Invoice or document numbers a transaction refers to, most explicit first.
///
/// The extractor's own reference comes first, followed by numbers found in
/// the description. Duplicates are dropped, order is kept.
pub fn extract_references(tx: &Transaction) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    let mut push = |candidate: &str| {
        let cleaned = candidate.trim().trim_end_matches(['.', ',', ';', ':']);
        if !cleaned.is_empty() && !refs.iter().any(|r| r == cleaned) {
            refs.push(cleaned.to_string());
        }
    };

    if let Some(raw) = tx.raw_reference.as_deref() {
        push(raw);
    }

    let desc = tx.description.as_str();
    for m in re_coded_number().find_iter(desc) {
        push(m.as_str());
    }
    for re in [re_number_label(), re_invoice_lv()] {
        for caps in re.captures_iter(desc) {
            if let Some(m) = caps.get(1) {
                push(m.as_str());
            }
        }
    }

    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_core::Money;

    fn tx(description: &str, raw_reference: Option<&str>) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2025, 12, 5).unwrap(),
            amount: Money::from_cents(12100),
            counterparty: "Dati Holding".to_string(),
            description: description.to_string(),
            raw_reference: raw_reference.map(str::to_string),
        }
    }

    #[test]
    fn raw_reference_comes_first() {
        let refs = extract_references(&tx("Payment INV-2025-042", Some("A-17")));
        assert_eq!(refs, vec!["A-17", "INV-2025-042"]);
    }

    #[test]
    fn coded_numbers_from_description() {
        let refs = extract_references(&tx("Apmaksa DH-202512-10218 un DH-202512-10219", None));
        assert_eq!(refs, vec!["DH-202512-10218", "DH-202512-10219"]);
    }

    #[test]
    fn number_label_capture() {
        assert_eq!(extract_references(&tx("Invoice Nr. 12345.", None)), vec!["12345"]);
        assert_eq!(extract_references(&tx("invoice nr 88", None)), vec!["88"]);
    }

    #[test]
    fn latvian_invoice_phrase() {
        let refs = extract_references(&tx("Rēķins Nr 2025/14", None));
        assert!(refs.contains(&"2025/14".to_string()), "{refs:?}");
    }

    #[test]
    fn duplicates_are_dropped() {
        let refs = extract_references(&tx("INV-2025-042", Some("INV-2025-042")));
        assert_eq!(refs, vec!["INV-2025-042"]);
    }

    #[test]
    fn nothing_to_find() {
        assert!(extract_references(&tx("Card payment", None)).is_empty());
        assert!(extract_references(&tx("", Some("  "))).is_empty());
    }
}
