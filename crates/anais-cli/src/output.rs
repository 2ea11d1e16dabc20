use std::io::Write;
use std::path::PathBuf;

use anais_core::{MigrationReport, ProgressEvent};
use anais_ingest::MissingSource;
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn shorten(title: &str, max: usize) -> String {
    if title.chars().count() > max {
        let cut: String = title.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        title.to_string()
    }
}

/// Print the ingest summary before any article is sent to the model.
pub fn print_ingest_summary(
    w: &mut dyn Write,
    toc_name: &str,
    loaded: usize,
    missing: &[MissingSource],
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "Reading table of contents {}...", toc_name)?;
    writeln!(w, "Found {} articles to migrate", loaded)?;
    for m in missing {
        let line = format!("(Skipped #{} \"{}\": {})", m.seq, shorten(&m.title, 50), m.reason);
        if color.enabled() {
            writeln!(w, "{}", line.dimmed())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    writeln!(w)?;
    Ok(())
}

/// Print a real-time progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::ArticleStarted {
            index,
            total,
            id,
            title,
        } => {
            writeln!(w, "[{}/{}] Extracting {}: \"{}\"", index + 1, total, id, shorten(title, 50))?;
        }
        ProgressEvent::ArticleFinished {
            index,
            total,
            authors,
            references,
            completed_fields,
            ..
        } => {
            let mut detail = format!("{} authors, {} references", authors, references);
            if !completed_fields.is_empty() {
                detail.push_str(&format!(", completed {}", completed_fields.join(", ")));
            }
            if color.enabled() {
                writeln!(w, "[{}/{}] -> {} ({})", index + 1, total, "MIGRATED".green(), detail)?;
            } else {
                writeln!(w, "[{}/{}] -> MIGRATED ({})", index + 1, total, detail)?;
            }
        }
        ProgressEvent::ArticleFailed {
            index,
            total,
            kind,
            reason,
            ..
        } => {
            if color.enabled() {
                writeln!(w, "[{}/{}] -> {} {}", index + 1, total, kind.red(), reason.dimmed())?;
            } else {
                writeln!(w, "[{}/{}] -> {} {}", index + 1, total, kind, reason)?;
            }
        }
        ProgressEvent::ArticleNote { id, kind, message } => {
            if color.enabled() {
                writeln!(w, "{} {} ({}): {}", "WARNING:".yellow(), kind, id, message)?;
            } else {
                writeln!(w, "WARNING: {} ({}): {}", kind, id, message)?;
            }
        }
        ProgressEvent::AffiliationStarted { pairs, chunks } => {
            writeln!(w)?;
            writeln!(
                w,
                "Normalizing {} distinct affiliations in {} chunks...",
                pairs, chunks
            )?;
        }
        ProgressEvent::ChunkFinished {
            index,
            total,
            corrected,
            dropped,
        } => {
            write!(w, "  chunk {}/{}: {} corrected", index + 1, total, corrected)?;
            if *dropped > 0 {
                write!(w, ", {} left unchanged", dropped)?;
            }
            writeln!(w)?;
        }
        ProgressEvent::ChunkFailed {
            index,
            total,
            error,
        } => {
            if color.enabled() {
                writeln!(w, "  chunk {}/{}: {} {}", index + 1, total, "FAILED".red(), error)?;
            } else {
                writeln!(w, "  chunk {}/{}: FAILED {}", index + 1, total, error)?;
            }
        }
    }
    Ok(())
}

/// Print failures grouped at the end of a run.
pub fn print_failures(
    w: &mut dyn Write,
    report: &MigrationReport,
    color: ColorMode,
) -> std::io::Result<()> {
    if report.failures.is_empty() {
        return Ok(());
    }
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", "Articles not migrated:".bold())?;
    } else {
        writeln!(w, "Articles not migrated:")?;
    }
    for f in &report.failures {
        if color.enabled() {
            writeln!(w, "  #{} {} [{}] {}", f.seq, f.article_id, f.kind.red(), f.reason)?;
        } else {
            writeln!(w, "  #{} {} [{}] {}", f.seq, f.article_id, f.kind, f.reason)?;
        }
    }
    Ok(())
}

/// Print the final run summary.
pub fn print_summary(
    w: &mut dyn Write,
    report: &MigrationReport,
    missing: usize,
    written: &[PathBuf],
    color: ColorMode,
) -> std::io::Result<()> {
    let migrated = report.articles.len();
    let failed = report.failures.len();
    let authors: usize = report.articles.iter().map(|a| a.authors.len()).sum();
    let references: usize = report.articles.iter().map(|a| a.references.len()).sum();

    writeln!(w)?;
    writeln!(w, "{}", "=".repeat(60))?;
    if color.enabled() {
        writeln!(w, "{}", "SUMMARY".bold())?;
    } else {
        writeln!(w, "SUMMARY")?;
    }
    writeln!(w, "{}", "=".repeat(60))?;

    if color.enabled() {
        writeln!(w, "  Migrated:   {}", migrated.to_string().green())?;
        writeln!(w, "  Failed:     {}", failed.to_string().red())?;
    } else {
        writeln!(w, "  Migrated:   {}", migrated)?;
        writeln!(w, "  Failed:     {}", failed)?;
    }
    if missing > 0 {
        writeln!(w, "  No source:  {}", missing)?;
    }
    writeln!(w, "  Authors:    {}", authors)?;
    writeln!(w, "  References: {}", references)?;
    if !report.notes.is_empty() {
        writeln!(w, "  Warnings:   {}", report.notes.len())?;
    }

    match &report.affiliation {
        Some(aff) => {
            writeln!(
                w,
                "  Affiliations: {} distinct, {} corrected, {} authors updated",
                aff.distinct_pairs, aff.corrected_pairs, aff.authors_updated
            )?;
            if !aff.failed_chunks.is_empty() {
                let line = format!("  {} chunks failed and kept their values", aff.failed_chunks.len());
                if color.enabled() {
                    writeln!(w, "{}", line.yellow())?;
                } else {
                    writeln!(w, "{}", line)?;
                }
            }
        }
        None if report.cancelled => {
            let line = "  Run cancelled: affiliations were not normalized";
            if color.enabled() {
                writeln!(w, "{}", line.yellow())?;
            } else {
                writeln!(w, "{}", line)?;
            }
        }
        None => {}
    }

    if !written.is_empty() {
        writeln!(w)?;
        writeln!(w, "Wrote:")?;
        for path in written {
            writeln!(w, "  {}", path.display())?;
        }
    }
    Ok(())
}
