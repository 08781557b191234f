use std::collections::BTreeSet;
use std::path::PathBuf;

use notefeed::Config;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Args {
    pub config: Option<PathBuf>,
    pub relays: Vec<String>,
    pub npubs: Vec<String>,
    pub nsec: Option<String>,
    pub nwc: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub zap: Option<String>,
    pub author: Option<String>,
    pub amount: Option<u64>,
    pub comment: String,
    /// Bad or missing flag values, logged once logging is up.
    pub problems: Vec<String>,
}

impl Args {
    // parse arguments, return set of unrecognized args
    pub fn parse(args: &[String]) -> (Self, BTreeSet<String>) {
        let mut unrecognized_args = BTreeSet::new();
        let mut res = Args::default();

        let mut i = 0;
        let len = args.len();
        while i < len {
            let arg = &args[i];

            if arg == "--config" || arg == "-c" {
                i += 1;
                let Some(path) = args.get(i) else {
                    res.problems.push("config argument missing?".to_owned());
                    continue;
                };
                res.config = Some(PathBuf::from(path));
            } else if arg == "--relay" || arg == "-r" {
                i += 1;
                let Some(relay) = args.get(i) else {
                    res.problems.push("relay argument missing?".to_owned());
                    continue;
                };
                res.relays.push(relay.clone());
            } else if arg == "--npub" || arg == "--pub" {
                i += 1;
                let Some(npub) = args.get(i) else {
                    res.problems.push("npub argument missing?".to_owned());
                    continue;
                };
                res.npubs.push(npub.clone());
            } else if arg == "--nsec" || arg == "--sec" {
                i += 1;
                let Some(nsec) = args.get(i) else {
                    res.problems.push("sec argument missing?".to_owned());
                    continue;
                };
                res.nsec = Some(nsec.clone());
            } else if arg == "--nwc" {
                i += 1;
                let Some(uri) = args.get(i) else {
                    res.problems.push("nwc argument missing?".to_owned());
                    continue;
                };
                res.nwc = Some(uri.clone());
            } else if arg == "--log-dir" {
                i += 1;
                let Some(dir) = args.get(i) else {
                    res.problems.push("log-dir argument missing?".to_owned());
                    continue;
                };
                res.log_dir = Some(PathBuf::from(dir));
            } else if arg == "--zap" {
                i += 1;
                let Some(note) = args.get(i) else {
                    res.problems.push("zap argument missing?".to_owned());
                    continue;
                };
                res.zap = Some(note.clone());
            } else if arg == "--author" {
                i += 1;
                let Some(author) = args.get(i) else {
                    res.problems.push("author argument missing?".to_owned());
                    continue;
                };
                res.author = Some(author.clone());
            } else if arg == "--amount" {
                i += 1;
                let Some(amount) = args.get(i) else {
                    res.problems.push("amount argument missing?".to_owned());
                    continue;
                };
                match amount.parse::<u64>() {
                    Ok(sats) => res.amount = Some(sats),
                    Err(err) => res
                        .problems
                        .push(format!("failed to parse amount '{amount}': {err}")),
                }
            } else if arg == "--comment" {
                i += 1;
                let Some(comment) = args.get(i) else {
                    res.problems.push("comment argument missing?".to_owned());
                    continue;
                };
                res.comment = comment.clone();
            } else {
                unrecognized_args.insert(arg.clone());
            }

            i += 1;
        }

        (res, unrecognized_args)
    }

    /// Command line values win over the config file. Relays and npubs given
    /// here replace the file's lists rather than extending them.
    pub fn apply(&self, config: &mut Config) {
        if !self.relays.is_empty() {
            config.relays = self.relays.clone();
        }

        if !self.npubs.is_empty() {
            config.npubs = self.npubs.clone();
        }

        if let Some(nwc) = &self.nwc {
            config.nwc_uri = Some(nwc.clone());
        }

        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }
    }
}
