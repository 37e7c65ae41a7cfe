//! Item handler that runs an external command per item and kills it when the scope ends.

use anyhow::{Context, Result, anyhow, bail};
use std::process::{Command, Stdio};

use crate::Scope;
use crate::utils::config::{CHILD_POLL_INTERVAL, ITEM_PLACEHOLDER};

/// Program plus argument template. `{}` in any argument is replaced by the item;
/// with no placeholder anywhere, the item is appended as the last argument.
#[derive(Clone, Debug)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
    has_placeholder: bool,
}

impl CommandTemplate {
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("no command given"))?;
        if program.trim().is_empty() {
            bail!("empty command");
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            has_placeholder: args.iter().any(|a| a.contains(ITEM_PLACEHOLDER)),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for one item.
    pub fn args_for(&self, item: &str) -> Vec<String> {
        if self.has_placeholder {
            self.args
                .iter()
                .map(|a| a.replace(ITEM_PLACEHOLDER, item))
                .collect()
        } else {
            let mut args = self.args.clone();
            args.push(item.to_string());
            args
        }
    }

    /// Run for one item. Polls the child and kills it once `scope` is cancelled.
    pub fn run(&self, item: &str, scope: &Scope) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(self.args_for(item))
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn `{}` for {:?}", self.program, item))?;
        loop {
            if let Some(status) = child.try_wait().context("wait for child")? {
                if status.success() {
                    return Ok(());
                }
                bail!("`{}` for {:?} exited with {}", self.program, item, status);
            }
            if !scope.sleep(CHILD_POLL_INTERVAL) {
                let _ = child.kill();
                let _ = child.wait();
                bail!("`{}` for {:?} killed: deadline reached", self.program, item);
            }
        }
    }
}
