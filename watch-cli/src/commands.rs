use watch_core::{EventKind, Monitor, OwnerId, Project, ProjectId, WatchError, WatchEvent};

pub const HELP: &str = "\
commands:
  add <url> [name]          start watching a page
  list                      show watched pages
  pause <n> | resume <n>    stop or restart checks for page n
  interval <n> <seconds>    change how often page n is checked
  confirm <n> on|off        hourly \"no changes\" confirmations for page n
  rename <n> [name]         change the label of page n
  delete <n>                stop watching page n
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add { url: String, name: Option<String> },
    List,
    Pause(usize),
    Resume(usize),
    Interval(usize, i64),
    Confirm(usize, bool),
    Rename(usize, Option<String>),
    Delete(usize),
    Help,
    Quit,
}

pub enum Reply {
    Text(String),
    Silent,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(HELP.to_owned());
        };
        let rest: Vec<&str> = words.collect();
        let joined = |parts: &[&str]| {
            let text = parts.join(" ");
            (!text.is_empty()).then_some(text)
        };

        match (verb, rest.as_slice()) {
            ("add", [url, name @ ..]) => Ok(Command::Add {
                url: (*url).to_owned(),
                name: joined(name),
            }),
            ("list" | "status", []) => Ok(Command::List),
            ("pause", [n]) => Ok(Command::Pause(index(n)?)),
            ("resume", [n]) => Ok(Command::Resume(index(n)?)),
            ("interval", [n, seconds]) => {
                let seconds = seconds
                    .parse()
                    .map_err(|_| format!("not a number of seconds: {seconds}"))?;
                Ok(Command::Interval(index(n)?, seconds))
            }
            ("confirm", [n, "on"]) => Ok(Command::Confirm(index(n)?, true)),
            ("confirm", [n, "off"]) => Ok(Command::Confirm(index(n)?, false)),
            ("rename", [n, name @ ..]) => Ok(Command::Rename(index(n)?, joined(name))),
            ("delete", [n]) => Ok(Command::Delete(index(n)?)),
            ("help", _) => Ok(Command::Help),
            ("quit" | "exit", _) => Ok(Command::Quit),
            _ => Err(format!("unrecognised command: {}\n{HELP}", line.trim())),
        }
    }

    pub async fn run(self, monitor: &Monitor, owner: &OwnerId) -> Reply {
        match self.execute(monitor, owner).await {
            Ok(reply) => reply,
            Err(err) => Reply::Text(format!("error: {err}")),
        }
    }

    async fn execute(self, monitor: &Monitor, owner: &OwnerId) -> Result<Reply, String> {
        let reply = match self {
            Command::Add { url, name } => {
                let project = monitor
                    .add_project_named(owner, &url, name.as_deref())
                    .await
                    .map_err(describe)?;
                format!("watching {} ({}), first check under way", project.display_name, project.target)
            }
            Command::List => {
                let statuses = monitor.status(owner).await;
                if statuses.is_empty() {
                    "nothing watched yet".to_owned()
                } else {
                    statuses
                        .iter()
                        .enumerate()
                        .map(|(i, s)| summarize(i + 1, &s.project, s.running))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            Command::Pause(n) => {
                let id = resolve(monitor, owner, n).await?;
                let project = monitor.set_active(owner, id, false).await.map_err(describe)?;
                format!("paused {}", project.display_name)
            }
            Command::Resume(n) => {
                let id = resolve(monitor, owner, n).await?;
                let project = monitor.set_active(owner, id, true).await.map_err(describe)?;
                format!("resumed {}", project.display_name)
            }
            Command::Interval(n, seconds) => {
                let id = resolve(monitor, owner, n).await?;
                let project = monitor.set_interval(owner, id, seconds).await.map_err(describe)?;
                format!("{} now checked every {}s", project.display_name, project.interval_seconds)
            }
            Command::Confirm(n, enabled) => {
                let id = resolve(monitor, owner, n).await?;
                let project = monitor
                    .set_notify_on_no_change(owner, id, enabled)
                    .await
                    .map_err(describe)?;
                let state = if project.notify_on_no_change { "on" } else { "off" };
                format!("no-change confirmations {state} for {}", project.display_name)
            }
            Command::Rename(n, name) => {
                let id = resolve(monitor, owner, n).await?;
                let project = monitor
                    .rename_project(owner, id, name.as_deref())
                    .await
                    .map_err(describe)?;
                format!("renamed to {}", project.display_name)
            }
            Command::Delete(n) => {
                let id = resolve(monitor, owner, n).await?;
                let project = monitor.delete_project(owner, id).await.map_err(describe)?;
                format!("stopped watching {}", project.display_name)
            }
            Command::Help => HELP.to_owned(),
            Command::Quit => return Ok(Reply::Silent),
        };
        Ok(Reply::Text(reply))
    }
}

fn index(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(format!("expected a page number from `list`, got {raw}")),
    }
}

async fn resolve(monitor: &Monitor, owner: &OwnerId, n: usize) -> Result<ProjectId, String> {
    monitor
        .list_projects(owner)
        .await
        .get(n - 1)
        .map(|p| p.id)
        .ok_or_else(|| format!("no page number {n}"))
}

fn describe(err: WatchError) -> String {
    match err {
        WatchError::InvalidLocator(_) => {
            "links must start with http:// or https://, e.g. https://example.com".to_owned()
        }
        other => other.to_string(),
    }
}

fn summarize(n: usize, project: &Project, running: bool) -> String {
    let state = match (project.active, running) {
        (true, true) => "active",
        (true, false) => "starting",
        (false, _) => "paused",
    };
    let checked = project
        .last_checked_at
        .map(|at| at.format("%d.%m.%Y %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "not yet".to_owned());
    format!(
        "{n}. {} [{state}] every {}s, last check {checked}\n   {}",
        project.display_name, project.interval_seconds, project.target
    )
}

pub fn render_event(event: &WatchEvent) -> String {
    let stamp = event.at.format("%d.%m.%Y %H:%M:%S");
    let head = format!("[{stamp}] {} ({})", event.display_name, event.target);
    match &event.kind {
        EventKind::FirstObservation => format!("{head}: first check done, page saved as baseline"),
        EventKind::ContentChanged => format!("{head}: the page has changed"),
        EventKind::NewFeedItems(items) => items
            .iter()
            .map(|item| {
                let link = item.link.as_deref().unwrap_or("");
                format!("{head}: new item: {} {link}", item.title)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        EventKind::FetchFailed { reason } => {
            format!("{head}: could not check the page ({reason}), will retry on the next cycle")
        }
        EventKind::UnchangedNotice => format!("{head}: no new changes"),
    }
}
