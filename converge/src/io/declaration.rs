//! Resource declarations loaded from TOML.
//!
//! ```toml
//! [node]
//! name = "web01"
//!
//! [resource]
//! type = "bash"
//! name = "install app"
//! attributes = { code = "make install", guard_interpreter = "bash" }
//!
//! [[guards]]
//! kind = "not_if"
//! command = "test -x /usr/local/bin/app"
//!
//! [[guards]]
//! kind = "only_if"
//! resource = "execute"
//! handled = ["shell_command_failed"]
//! statements = [{ set = "command", value = "ping -c1 repo" }]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::core::block::{ConfigBlock, GuardBlock, Statement};
use crate::core::types::{AttrValue, HandledKinds, SourceLocation};
use crate::guard::conditional::{CommandOptions, Conditional, GuardKind};
use crate::resource::Resource;
use crate::resource::node::Node;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Declaration {
    pub node: Node,
    pub resource: ResourceDeclaration,
    #[serde(default)]
    pub guards: Vec<GuardDeclaration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDeclaration {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardDeclaration {
    pub kind: GuardKind,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub options: CommandOptions,
    /// Resource type of a block guard.
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub handled: HandledKinds,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub args: Vec<AttrValue>,
    #[serde(default)]
    pub statements: Vec<Statement>,
    /// Line of the guard in its declaration file, for diagnostics.
    #[serde(default)]
    pub line: Option<u32>,
}

impl GuardDeclaration {
    /// Block guard described by this declaration, if it has one.
    pub fn block(&self, file: &Path) -> Result<Option<GuardBlock>> {
        let Some(resource_type) = &self.resource else {
            if !self.statements.is_empty() {
                bail!("{} guard has statements but no `resource`", self.kind);
            }
            return Ok(None);
        };
        let mut block = GuardBlock::new(
            resource_type.clone(),
            ConfigBlock {
                params: self.params.clone(),
                statements: self.statements.clone(),
            },
        )
        .handled(self.handled.clone());
        block.args = self.args.clone();
        block.action = self.action.clone();
        block.source_location = Some(SourceLocation::new(
            file.display().to_string(),
            self.line.unwrap_or(0),
        ));
        Ok(Some(block))
    }

    /// Declare this guard on `parent`.
    pub fn to_conditional(&self, parent: &dyn Resource, file: &Path) -> Result<Conditional> {
        let block = self.block(file)?;
        let conditional = Conditional::declare(
            parent,
            self.kind,
            self.command.clone(),
            self.options.clone(),
            block,
        )
        .with_context(|| format!("declare {} guard on {}", self.kind, parent.label()))?;
        Ok(conditional)
    }
}

pub fn load_declaration(path: &Path) -> Result<Declaration> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_declaration(&contents).with_context(|| format!("parse {}", path.display()))
}

pub fn parse_declaration(contents: &str) -> Result<Declaration> {
    let declaration: Declaration = toml::from_str(contents)?;
    Ok(declaration)
}
