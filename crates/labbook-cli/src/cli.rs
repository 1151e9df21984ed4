//! Command-line argument parsing.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use labbook_core::api::client::DEFAULT_PAGE_SIZE;
use labbook_core::models::{Experiment, ExperimentStatus};

pub const USAGE: &str = "\
Usage: labbook <command> [args]

Commands:
  login [username]                      Log in (password from LABBOOK_PASSWORD or prompt)
  logout                                Forget the stored session
  whoami                                Show the logged-in user
  register                              Create a new account
  experiments list [--search <term>]    List experiments, optionally filtered by title
  experiments search <keyword> [--page <n>] [--size <n>]
  experiments show <id>
  experiments create --title <title> [fields]
  experiments update <id> [fields]
  experiments status <id> <status>
  experiments delete <id>
  profile                               Show your profile
  profile edit [--first-name <s>] [--last-name <s>] [--email <s>]
  profile picture <path>                Upload a profile picture
  watch                                 Live dashboard (type to filter, `r` reload, `q` quit)

Experiment fields:
  --title --objective --hypothesis --materials --procedure
  --observations --results --conclusion --status --date <YYYY-MM-DD>";

#[derive(Debug, PartialEq)]
pub enum Command {
    Help,
    Login { username: Option<String> },
    Logout,
    Whoami,
    Register,
    Experiments(ExperimentCommand),
    Profile(ProfileCommand),
    Watch,
}

#[derive(Debug, PartialEq)]
pub enum ExperimentCommand {
    List { search: Option<String> },
    Search { keyword: String, page: u32, size: u32 },
    Show { id: i64 },
    Create { fields: ExperimentFields },
    Update { id: i64, fields: ExperimentFields },
    Status { id: i64, status: ExperimentStatus },
    Delete { id: i64 },
}

#[derive(Debug, PartialEq)]
pub enum ProfileCommand {
    View,
    Edit {
        first_name: Option<String>,
        last_name: Option<String>,
        email: Option<String>,
    },
    Picture { path: PathBuf },
}

/// Experiment form values given on the command line. Unset fields are left alone.
#[derive(Debug, Default, PartialEq)]
pub struct ExperimentFields {
    pub title: Option<String>,
    pub objective: Option<String>,
    pub hypothesis: Option<String>,
    pub materials: Option<String>,
    pub procedure_steps: Option<String>,
    pub observations: Option<String>,
    pub results: Option<String>,
    pub conclusion: Option<String>,
    pub status: Option<ExperimentStatus>,
    pub experiment_date: Option<NaiveDate>,
}

impl ExperimentFields {
    fn from_flags(flags: &mut Flags) -> Result<Self> {
        let status = flags
            .take("status")
            .map(|s| s.parse::<ExperimentStatus>().map_err(|e| anyhow!(e)))
            .transpose()?;
        let experiment_date = flags
            .take("date")
            .map(|d| {
                NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", d))
            })
            .transpose()?;

        Ok(Self {
            title: flags.take("title"),
            objective: flags.take("objective"),
            hypothesis: flags.take("hypothesis"),
            materials: flags.take("materials"),
            procedure_steps: flags.take("procedure"),
            observations: flags.take("observations"),
            results: flags.take("results"),
            conclusion: flags.take("conclusion"),
            status,
            experiment_date,
        })
    }

    pub fn apply(self, experiment: &mut Experiment) {
        fn set(target: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *target = value;
            }
        }
        set(&mut experiment.title, self.title);
        set(&mut experiment.objective, self.objective);
        set(&mut experiment.hypothesis, self.hypothesis);
        set(&mut experiment.materials, self.materials);
        set(&mut experiment.procedure_steps, self.procedure_steps);
        set(&mut experiment.observations, self.observations);
        set(&mut experiment.results, self.results);
        set(&mut experiment.conclusion, self.conclusion);
        if let Some(status) = self.status {
            experiment.status = status;
        }
        if let Some(date) = self.experiment_date {
            experiment.experiment_date = Some(date);
        }
    }
}

/// `--name value` pairs split off from positional arguments.
struct Flags {
    positional: Vec<String>,
    named: HashMap<String, String>,
}

impl Flags {
    fn parse(args: &[String]) -> Result<Self> {
        let mut positional = Vec::new();
        let mut named = HashMap::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if let Some(name) = arg.strip_prefix("--") {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("Missing value for --{}", name))?;
                named.insert(name.to_string(), value.clone());
            } else {
                positional.push(arg.clone());
            }
        }
        Ok(Self { positional, named })
    }

    fn take(&mut self, name: &str) -> Option<String> {
        self.named.remove(name)
    }

    fn take_number<T: std::str::FromStr>(&mut self, name: &str, default: T) -> Result<T> {
        match self.take(name) {
            Some(value) => value
                .parse()
                .map_err(|_| anyhow!("Invalid value for --{}: {}", name, value)),
            None => Ok(default),
        }
    }

    fn positional(&self, index: usize, what: &str) -> Result<&str> {
        self.positional
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("Missing {}", what))
    }

    fn id(&self, index: usize) -> Result<i64> {
        let raw = self.positional(index, "experiment id")?;
        raw.parse().map_err(|_| anyhow!("Invalid experiment id: {}", raw))
    }

    /// Fail on flags nobody consumed.
    fn finish(self) -> Result<()> {
        if let Some(name) = self.named.keys().next() {
            bail!("Unknown option --{}", name);
        }
        Ok(())
    }
}

impl Command {
    /// Parse the arguments following the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some((first, rest)) = args.split_first() else {
            return Ok(Command::Help);
        };
        let mut flags = Flags::parse(rest)?;

        let command = match first.as_str() {
            "help" | "--help" | "-h" => Command::Help,
            "login" => Command::Login {
                username: flags.positional.first().cloned(),
            },
            "logout" => Command::Logout,
            "whoami" => Command::Whoami,
            "register" => Command::Register,
            "watch" => Command::Watch,
            "experiments" | "exp" => Command::Experiments(Self::parse_experiments(&mut flags)?),
            "profile" => Command::Profile(Self::parse_profile(&mut flags)?),
            other => bail!("Unknown command: {}", other),
        };

        flags.finish()?;
        Ok(command)
    }

    fn parse_experiments(flags: &mut Flags) -> Result<ExperimentCommand> {
        let sub = flags.positional.first().cloned().unwrap_or_else(|| "list".to_string());
        Ok(match sub.as_str() {
            "list" => ExperimentCommand::List {
                search: flags.take("search"),
            },
            "search" => ExperimentCommand::Search {
                keyword: flags.positional(1, "search keyword")?.to_string(),
                page: flags.take_number("page", 0)?,
                size: flags.take_number("size", DEFAULT_PAGE_SIZE)?,
            },
            "show" => ExperimentCommand::Show { id: flags.id(1)? },
            "create" => {
                let fields = ExperimentFields::from_flags(flags)?;
                if fields.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
                    bail!("A title is required (--title)");
                }
                ExperimentCommand::Create { fields }
            }
            "update" => ExperimentCommand::Update {
                id: flags.id(1)?,
                fields: ExperimentFields::from_flags(flags)?,
            },
            "status" => {
                let id = flags.id(1)?;
                let status = flags
                    .positional(2, "status")?
                    .parse::<ExperimentStatus>()
                    .map_err(|e| anyhow!(e))?;
                ExperimentCommand::Status { id, status }
            }
            "delete" => ExperimentCommand::Delete { id: flags.id(1)? },
            other => bail!("Unknown experiments command: {}", other),
        })
    }

    fn parse_profile(flags: &mut Flags) -> Result<ProfileCommand> {
        Ok(match flags.positional.first().map(String::as_str) {
            None | Some("view") => ProfileCommand::View,
            Some("edit") => ProfileCommand::Edit {
                first_name: flags.take("first-name"),
                last_name: flags.take("last-name"),
                email: flags.take("email"),
            },
            Some("picture") => ProfileCommand::Picture {
                path: PathBuf::from(flags.positional(1, "picture path")?),
            },
            Some(other) => bail!("Unknown profile command: {}", other),
        })
    }
}
