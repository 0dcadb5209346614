// (c) 2024 Ross Younger
//! Help text styling

#[allow(clippy::enum_glob_use)]
use anstyle::AnsiColor::*;
use anstyle::Color::Ansi;
use clap::builder::styling::Styles;

const ERROR: anstyle::Style = anstyle::Style::new().bold().fg_color(Some(Ansi(Red)));
const WARNING: anstyle::Style = anstyle::Style::new().bold().fg_color(Some(Ansi(Yellow)));
const INFO: anstyle::Style = anstyle::Style::new().fg_color(Some(Ansi(Green)));
const HEADING: anstyle::Style = anstyle::Style::new()
    .bold()
    .underline()
    .fg_color(Some(Ansi(Blue)));

pub(crate) const CLAP_STYLES: Styles = Styles::styled()
    .usage(HEADING)
    .header(HEADING)
    .literal(anstyle::Style::new().bold())
    .invalid(WARNING)
    .error(ERROR)
    .valid(INFO.bold())
    .placeholder(INFO);
