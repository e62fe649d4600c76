use std::io::{self, Write};

use serde::Deserialize;

/// One event of a pull stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub completed: u64,
}

impl PullProgress {
    pub fn is_success(&self) -> bool { self.status == "success" }
}

/// Completion percentage; 0 when the total is not known yet.
pub fn percent(completed: u64, total: u64) -> f64 {
    if total == 0 { return 0.0; }
    completed as f64 / total as f64 * 100.0
}

pub fn format_progress(completed: u64, total: u64) -> String {
    format!("Progress: {}/{} ({:.2}%)", completed, total, percent(completed, total))
}

/// Renders pull progress on a single terminal line, overwriting in place.
pub struct ProgressRenderer<W: Write> {
    out: W,
    last: String,
    width: usize,
}

impl<W: Write> ProgressRenderer<W> {
    pub fn new(out: W) -> Self { Self { out, last: String::new(), width: 0 } }

    pub fn render(&mut self, p: &PullProgress) -> io::Result<()> {
        let line = if p.total > 0 {
            format_progress(p.completed.min(p.total), p.total)
        } else if !p.status.is_empty() {
            p.status.clone()
        } else {
            return Ok(());
        };
        if line == self.last { return Ok(()); }
        let cols = line.chars().count();
        let pad = self.width.saturating_sub(cols);
        write!(self.out, "\r{}{}", line, " ".repeat(pad))?;
        self.out.flush()?;
        self.width = self.width.max(cols);
        self.last = line;
        Ok(())
    }

    /// Print a full line of text, ending any in-place progress line first.
    pub fn message(&mut self, text: &str) -> io::Result<()> {
        self.finish()?;
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    pub fn finish(&mut self) -> io::Result<()> {
        if !self.last.is_empty() { writeln!(self.out)?; }
        self.out.flush()?;
        self.last.clear();
        self.width = 0;
        Ok(())
    }

    pub fn into_inner(self) -> W { self.out }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(completed: u64, total: u64) -> PullProgress {
        PullProgress { status: "pulling".into(), digest: Some("sha256:aa".into()), total, completed }
    }

    #[test]
    fn quarter_progress() {
        assert_eq!(format_progress(50, 200), "Progress: 50/200 (25.00%)");
    }

    #[test]
    fn zero_total_does_not_divide() {
        assert_eq!(percent(10, 0), 0.0);
        assert_eq!(format_progress(0, 0), "Progress: 0/0 (0.00%)");
    }

    #[test]
    fn overwrites_in_place() {
        let mut r = ProgressRenderer::new(Vec::new());
        r.render(&ev(50, 200)).unwrap();
        r.render(&ev(200, 200)).unwrap();
        r.finish().unwrap();
        let out = String::from_utf8(r.into_inner()).unwrap();
        assert_eq!(out, "\rProgress: 50/200 (25.00%)\rProgress: 200/200 (100.00%)\n");
        assert_eq!(out.matches('\n').count(), 1);
    }

    #[test]
    fn repeated_events_are_not_rerendered() {
        let mut r = ProgressRenderer::new(Vec::new());
        for _ in 0..100 { r.render(&ev(1, 4)).unwrap(); }
        let out = String::from_utf8(r.into_inner()).unwrap();
        assert_eq!(out.matches('\r').count(), 1);
    }

    #[test]
    fn shorter_line_pads_over_longer() {
        let mut r = ProgressRenderer::new(Vec::new());
        r.render(&ev(50, 200)).unwrap();
        r.render(&PullProgress { status: "verifying".into(), ..Default::default() }).unwrap();
        let out = String::from_utf8(r.into_inner()).unwrap();
        let last = out.rsplit('\r').next().unwrap();
        assert!(last.starts_with("verifying"));
        assert_eq!(last.len(), "Progress: 50/200 (25.00%)".len());
    }

    #[test]
    fn padding_counts_characters() {
        let mut r = ProgressRenderer::new(Vec::new());
        r.render(&PullProgress { status: "vérification du résumé".into(), ..Default::default() }).unwrap();
        r.render(&PullProgress { status: "ok".into(), ..Default::default() }).unwrap();
        let out = String::from_utf8(r.into_inner()).unwrap();
        let last = out.rsplit('\r').next().unwrap();
        assert_eq!(last.chars().count(), "vérification du résumé".chars().count());
        assert_eq!(last.trim_end(), "ok");
    }

    #[test]
    fn message_closes_progress_line() {
        let mut r = ProgressRenderer::new(Vec::new());
        r.message("Updating a").unwrap();
        r.render(&ev(1, 2)).unwrap();
        r.message("Updating b").unwrap();
        let out = String::from_utf8(r.into_inner()).unwrap();
        assert_eq!(out, "Updating a\n\rProgress: 1/2 (50.00%)\nUpdating b\n");
    }

    #[test]
    fn decodes_stream_line() {
        let p: PullProgress = serde_json::from_str(r#"{"status":"pulling abc","digest":"sha256:abc","total":10,"completed":3}"#).unwrap();
        assert_eq!(p.completed, 3);
        let s: PullProgress = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(s.is_success());
    }
}
