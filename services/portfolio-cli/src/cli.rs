//! Command-line parsing

use anyhow::{Context, Result, bail};

pub const USAGE: &str = "\
usage: portfolio-cli [--config <path>] <command>

commands:
  status                         show the current auth state
  login <username>               sign in with a password (PORTFOLIO_PASSWORD or stdin)
  login --browser                print the hosted login URL
  callback <url>                 finish a hosted login from the redirect URL
  logout                         end the session
  navigate <path>                show where the route guard sends <path>
  projects [--featured | --category <c> | --technology <t> | <id>]
  skills [--category <c> | --level <n> | <id>]
  experiences [--current | <id>]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectQuery {
    All,
    Featured,
    Category(String),
    Technology(String),
    Id(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillQuery {
    All,
    Category(String),
    Level(i32),
    Id(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExperienceQuery {
    All,
    Current,
    Id(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Login { username: String },
    BrowserLogin,
    Callback { url: String },
    Logout,
    Navigate { path: String },
    Projects(ProjectQuery),
    Skills(SkillQuery),
    Experiences(ExperienceQuery),
}

#[derive(Debug, PartialEq, Eq)]
pub struct Args {
    pub config: Option<String>,
    pub command: Command,
}

fn parse_id(value: &str) -> Result<i64> {
    value
        .parse()
        .with_context(|| format!("expected a numeric id, got {value:?}"))
}

/// Parse arguments, excluding the program name.
pub fn parse(args: &[String]) -> Result<Args> {
    let mut config = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config = Some(iter.next().context("--config needs a path")?.clone());
        } else {
            rest.push(arg.as_str());
        }
    }

    let command = match rest.as_slice() {
        [] => bail!("missing command"),
        ["status"] => Command::Status,
        ["login", "--browser"] => Command::BrowserLogin,
        ["login", username] => Command::Login {
            username: (*username).to_owned(),
        },
        ["callback", url] => Command::Callback {
            url: (*url).to_owned(),
        },
        ["logout"] => Command::Logout,
        ["navigate", path] => Command::Navigate {
            path: (*path).to_owned(),
        },
        ["projects"] => Command::Projects(ProjectQuery::All),
        ["projects", "--featured"] => Command::Projects(ProjectQuery::Featured),
        ["projects", "--category", c] => Command::Projects(ProjectQuery::Category((*c).to_owned())),
        ["projects", "--technology", t] => {
            Command::Projects(ProjectQuery::Technology((*t).to_owned()))
        }
        ["projects", id] => Command::Projects(ProjectQuery::Id(parse_id(id)?)),
        ["skills"] => Command::Skills(SkillQuery::All),
        ["skills", "--category", c] => Command::Skills(SkillQuery::Category((*c).to_owned())),
        ["skills", "--level", n] => Command::Skills(SkillQuery::Level(
            n.parse()
                .with_context(|| format!("expected a numeric level, got {n:?}"))?,
        )),
        ["skills", id] => Command::Skills(SkillQuery::Id(parse_id(id)?)),
        ["experiences"] => Command::Experiences(ExperienceQuery::All),
        ["experiences", "--current"] => Command::Experiences(ExperienceQuery::Current),
        ["experiences", id] => Command::Experiences(ExperienceQuery::Id(parse_id(id)?)),
        other => bail!("unrecognized command: {}", other.join(" ")),
    };

    Ok(Args { config, command })
}
