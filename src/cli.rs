//! Command-line surface: listen specs and the ordered matcher list.
//!
//! The registry's evaluation order is the order matcher flags appear
//! on the command line, across flag kinds; it is reconstructed from
//! argument indices after parsing. All diagnostics from this module
//! are fatal: they are printed to stdout and the process exits with
//! code 1 before any socket is opened.

use std::ffi::OsString;

use clap::error::ErrorKind;
use clap::{Arg, ArgAction, ArgMatches, Command};
use regex::bytes::Regex;

use crate::config::HostPort;
use crate::error::MuxError;
use crate::mux::{BackendTarget, MatchRule, Matcher, MatcherRegistry};

/// Parsed invocation: listen specs plus the matcher registry in
/// command-line order.
#[derive(Debug)]
pub struct Invocation {
    /// Listen specifications; ignored when sockets are inherited.
    pub listen_specs: Vec<HostPort>,
    /// Matchers in evaluation order.
    pub registry: MatcherRegistry,
}

fn command() -> Command {
    Command::new("portmuxd")
        .about("Protocol-detecting TCP connection multiplexer")
        .arg(
            Arg::new("listen")
                .value_name("[HOST:]PORT")
                .num_args(0..)
                .help("Listen specifications; ignored when sockets are inherited"),
        )
        .arg(
            Arg::new("ssh")
                .long("ssh")
                .value_name("[HOST:]PORT")
                .action(ArgAction::Append)
                .help("Forward connections starting with 'SSH-' to this backend"),
        )
        .arg(
            Arg::new("ssl")
                .long("ssl")
                .value_name("[HOST:]PORT")
                .action(ArgAction::Append)
                .help("Forward TLS handshakes to this backend"),
        )
        .arg(
            Arg::new("openvpn")
                .long("openvpn")
                .value_name("[HOST:]PORT")
                .action(ArgAction::Append)
                .help("Forward length-prefixed (OpenVPN/TCP) streams to this backend"),
        )
        .arg(
            Arg::new("regex")
                .long("regex")
                .value_names(["PATTERN", "[HOST:]PORT"])
                .num_args(2)
                .action(ArgAction::Append)
                .allow_hyphen_values(true)
                .help("Forward streams matching PATTERN anywhere in the first bytes"),
        )
}

/// Parse the process arguments, exiting on any error.
pub fn parse() -> Invocation {
    let matches = match command().try_get_matches_from(std::env::args_os()) {
        Ok(matches) => matches,
        Err(e) if e.kind() == ErrorKind::DisplayHelp => e.exit(),
        Err(e) => {
            println!("{e}");
            std::process::exit(1);
        }
    };

    match build_invocation(&matches) {
        Ok(invocation) => invocation,
        Err(e) => {
            println!("{e}");
            std::process::exit(1);
        }
    }
}

/// Parse an argument list without touching the process.
pub fn try_parse<I, T>(args: I) -> Result<Invocation, MuxError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = command()
        .try_get_matches_from(args)
        .map_err(|e| MuxError::Argument(e.to_string()))?;
    build_invocation(&matches)
}

fn build_invocation(matches: &ArgMatches) -> Result<Invocation, MuxError> {
    let listen_specs = matches
        .get_many::<String>("listen")
        .unwrap_or_default()
        .map(|spec| HostPort::parse(spec))
        .collect::<Result<Vec<_>, _>>()?;

    // Each entry keeps its command-line index so the registry can be
    // rebuilt in the order the flags were given, across flag kinds.
    let mut entries: Vec<(usize, Matcher)> = Vec::new();

    for (flag, rule) in [
        ("ssh", MatchRule::SshPrefix),
        ("ssl", MatchRule::TlsHandshake),
        ("openvpn", MatchRule::LengthPrefixed),
    ] {
        let (Some(indices), Some(values)) =
            (matches.indices_of(flag), matches.get_many::<String>(flag))
        else {
            continue;
        };
        for (index, spec) in indices.zip(values) {
            let backend = BackendTarget::from(HostPort::parse(spec)?);
            entries.push((index, Matcher::new(rule.clone(), backend)));
        }
    }

    if let (Some(indices), Some(values)) = (
        matches.indices_of("regex"),
        matches.get_many::<String>("regex"),
    ) {
        let indices: Vec<usize> = indices.collect();
        let values: Vec<&String> = values.collect();
        for (pair, pair_indices) in values.chunks_exact(2).zip(indices.chunks_exact(2)) {
            let (pattern, spec) = (pair[0], pair[1]);
            let compiled = Regex::new(pattern).map_err(|e| MuxError::RegexCompile {
                pattern: pattern.clone(),
                source: e,
            })?;
            let backend = BackendTarget::from(HostPort::parse(spec)?);
            entries.push((
                pair_indices[0],
                Matcher::new(MatchRule::Regex(compiled), backend),
            ));
        }
    }

    if entries.is_empty() {
        return Err(MuxError::Argument(format!(
            "no protocol matchers specified; use --ssh, --ssl, --openvpn, or --regex\n\n{}",
            command().render_usage()
        )));
    }

    entries.sort_by_key(|(index, _)| *index);
    let registry = MatcherRegistry::new(entries.into_iter().map(|(_, m)| m).collect());

    Ok(Invocation {
        listen_specs,
        registry,
    })
}
