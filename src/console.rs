// Progress bar styling
// (c) 2024 Ross Younger

use console::Term;
use indicatif::{MultiProgress, ProgressBar, ProgressFinish, ProgressStyle};

const PROGRESS_STYLE_COMPACT: &str =
    "{msg:.dim} {wide_bar:.cyan} {pos}/{len} sessions [{elapsed_precise:.dim}]";

// 11111111111111111111111111111111111111111111111111111111111111111111111111111111
// quic-cr_3 [=========================               ] 11/30 sessions [00:12:31]
// 11111111111111111111111111111111111111111111111111111111111111111111111111111111

// The counters and elapsed time need about 30 characters; a useful bar maybe 20 more.
const COUNTERS_AND_PROGRESS: usize = 50;

// 11111111111111111111111111111111111111111111111111111111111111111111111111111111
// quic-cr_3 over QUIC (careful resume) to lab-server.example:4433      [00:12:31]
// [==============================================================] 11/30 sessions
// 11111111111111111111111111111111111111111111111111111111111111111111111111111111

const PROGRESS_STYLE_OVERLONG: &str =
    "{wide_msg:.dim} [{elapsed_precise:.dim}]\n{wide_bar:.cyan} {pos}/{len} sessions";

fn use_long_style(terminal: &Term, msg_size: usize) -> bool {
    let term_width = terminal.size().1 as usize; // this returns a reasonable default if it can't detect
    msg_size + COUNTERS_AND_PROGRESS > term_width
}

pub(crate) fn progress_style_for(terminal: &Term, msg_size: usize) -> &'static str {
    if use_long_style(terminal, msg_size) {
        PROGRESS_STYLE_OVERLONG
    } else {
        PROGRESS_STYLE_COMPACT
    }
}

/// A bar counting browser sessions; hidden in quiet mode
pub(crate) fn session_progress(
    display: &MultiProgress,
    sessions: u64,
    longest_message: usize,
    quiet: bool,
) -> anyhow::Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    Ok(display.add(
        ProgressBar::new(sessions)
            .with_style(ProgressStyle::with_template(progress_style_for(
                &Term::stderr(),
                longest_message,
            ))?)
            .with_finish(ProgressFinish::Abandon),
    ))
}

#[cfg(test)]
mod test {
    use indicatif::MultiProgress;

    use super::session_progress;

    #[test]
    fn quiet_is_hidden() {
        let bar = session_progress(&MultiProgress::new(), 9, 10, true).unwrap();
        assert!(bar.is_hidden());
    }

    #[test]
    fn templates_parse() {
        for style in [super::PROGRESS_STYLE_COMPACT, super::PROGRESS_STYLE_OVERLONG] {
            let _ = indicatif::ProgressStyle::with_template(style).unwrap();
        }
    }
}
