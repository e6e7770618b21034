use std::fmt;
use tally_core::MatchResult;

/// Marks the note this tool owns on a statement; replaced on every run.
pub const AUDIT_NOTE_PREFIX: &str = "[AUDIT]";

/// One console line per transaction.
pub fn console_line(result: &MatchResult) -> String {
    let tx = &result.transaction;
    let head = format!("{} | {:>10} | {:<30}", tx.date, tx.amount, tx.counterparty);
    match result.matched_document_id {
        Some(id) if result.is_matched() => {
            format!("✓ {head} | → #{id} {}", result.matched_title.as_deref().unwrap_or(""))
        }
        _ => format!("✗ {head} | NOT FOUND"),
    }
}

fn note_block(result: &MatchResult, symbol: char) -> String {
    let tx = &result.transaction;
    let mut lines = vec![format!("{symbol} {} / {}", tx.date, tx.amount), tx.counterparty.clone()];
    if !tx.description.is_empty() {
        lines.push(tx.description.clone());
    }
    if let Some(id) = result.matched_document_id {
        lines.push(format!("→ #{id} {}", result.matched_title.as_deref().unwrap_or("")));
    }
    lines.join("\n")
}

/// Text of the audit note for one statement: missing transactions first,
/// then matched ones, each as a small block.
pub fn note_text(results: &[MatchResult]) -> String {
    let total = results.len();
    let (matched, missing): (Vec<&MatchResult>, Vec<&MatchResult>) =
        results.iter().partition(|r| r.is_matched());

    let mut parts = vec![format!("{AUDIT_NOTE_PREFIX} {}/{total}", matched.len())];
    if !missing.is_empty() {
        parts.push(format!("\n[MISSING][{}/{total}]", missing.len()));
        parts.extend(missing.iter().map(|r| note_block(r, '✗')));
    }
    if !matched.is_empty() {
        parts.push(format!("\n[MATCHED][{}/{total}]", matched.len()));
        parts.extend(matched.iter().map(|r| note_block(r, '✓')));
    }
    parts.join("\n\n")
}

/// Running totals across every statement of the month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub matched: usize,
}

impl Summary {
    pub fn add(&mut self, results: &[MatchResult]) {
        self.total += results.len();
        self.matched += results.iter().filter(|r| r.is_matched()).count();
    }

    pub fn unmatched(&self) -> usize {
        self.total - self.matched
    }

    /// Whole-number percentage, halves rounded to even, or `None` when
    /// there was nothing to match.
    pub fn coverage(&self) -> Option<u32> {
        if self.total == 0 {
            return None;
        }
        Some((self.matched as f64 / self.total as f64 * 100.0).round_ties_even() as u32)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "═".repeat(60))?;
        writeln!(f, "Total: {} transactions", self.total)?;
        writeln!(f, "  Matched:   {}", self.matched)?;
        write!(f, "  Unmatched: {}", self.unmatched())?;
        if let Some(pct) = self.coverage() {
            write!(f, "\n  Coverage:  {pct}%")?;
        }
        Ok(())
    }
}
