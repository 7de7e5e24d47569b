//! Rendering of node configuration templates.
//!
//! Templates reference node fields with `{{ .Field }}` placeholders. Every
//! scalar field of [`NodeConfig`] is available under its CamelCase name
//! (`ShortName`, `LongName`, `Kind`, `Image`, `Kernel`, `Sandbox`,
//! `NetworkMode`, `MgmtIPv4Gateway`, `MgmtIPv6Gateway`, `StartupConfig`,
//! `ResStartupConfig`, `LabDir`, `DeploymentStatus`,
//! `IsRootNamespaceBased`), plus `Env.NAME` and `Sysctls.NAME` for map
//! entries.
//!
//! Conditional blocks are supported:
//!
//! ```text
//! {{ if .MgmtIPv6Gateway }}::/0 {{ .MgmtIPv6Gateway }}{{ else }}! no v6{{ end }}
//! ```
//!
//! A condition holds when the field is a non-empty string, `true`, or a
//! non-empty collection. `{{-` and `-}}` trim the whitespace before and after
//! the action.

use labnode_runtime::NodeConfig;

use crate::error::{NodeError, Result};

/// Render `template` against the node configuration.
pub fn render(template: &str, cfg: &NodeConfig) -> Result<String> {
    let pieces = lex(template)?;
    let mut iter = pieces.into_iter();

    let (items, terminator) = parse(&mut iter)?;
    if let Some(t) = terminator {
        return Err(NodeError::Config(format!(
            "unexpected {{{{ {} }}}} without a matching {{{{ if }}}}",
            t.as_str()
        )));
    }

    let mut out = String::with_capacity(template.len());
    render_items(&items, cfg, &mut out)?;
    Ok(out)
}

enum Piece<'a> {
    Text(&'a str),
    Action(&'a str),
}

fn lex(template: &str) -> Result<Vec<Piece<'_>>> {
    let mut pieces = Vec::new();
    let mut rest = template;
    let mut trim_next = false;

    while let Some(start) = rest.find("{{") {
        let mut text = &rest[..start];
        if trim_next {
            text = text.trim_start();
        }

        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            NodeError::Config(format!(
                "unterminated template placeholder near {:?}",
                truncate(&rest[start..], 32)
            ))
        })?;

        let mut action = &after[..end];
        if let Some(inner) = action.strip_prefix('-') {
            if inner.starts_with(char::is_whitespace) {
                text = text.trim_end();
                action = inner;
            }
        }
        trim_next = false;
        if let Some(inner) = action.strip_suffix('-') {
            if inner.ends_with(char::is_whitespace) {
                trim_next = true;
                action = inner;
            }
        }

        pieces.push(Piece::Text(text));
        pieces.push(Piece::Action(action.trim()));
        rest = &after[end + 2..];
    }

    pieces.push(Piece::Text(if trim_next { rest.trim_start() } else { rest }));
    Ok(pieces)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    Else,
    End,
}

impl Terminator {
    fn as_str(self) -> &'static str {
        match self {
            Terminator::Else => "else",
            Terminator::End => "end",
        }
    }
}

enum Item<'a> {
    Text(&'a str),
    Field(&'a str),
    If {
        cond: &'a str,
        then: Vec<Item<'a>>,
        otherwise: Vec<Item<'a>>,
    },
}

/// Parse items up to the next `else`/`end` or the end of input.
fn parse<'a, I>(iter: &mut I) -> Result<(Vec<Item<'a>>, Option<Terminator>)>
where
    I: Iterator<Item = Piece<'a>>,
{
    let mut items = Vec::new();

    while let Some(piece) = iter.next() {
        let action = match piece {
            Piece::Text(text) => {
                if !text.is_empty() {
                    items.push(Item::Text(text));
                }
                continue;
            }
            Piece::Action(action) => action,
        };

        match action {
            "end" => return Ok((items, Some(Terminator::End))),
            "else" => return Ok((items, Some(Terminator::Else))),
            _ => {}
        }

        let Some(cond) = action.strip_prefix("if ") else {
            items.push(Item::Field(action));
            continue;
        };
        let cond = cond.trim();

        let (then, terminator) = parse(iter)?;
        let otherwise = match terminator {
            Some(Terminator::End) => Vec::new(),
            Some(Terminator::Else) => match parse(iter)? {
                (otherwise, Some(Terminator::End)) => otherwise,
                (_, Some(Terminator::Else)) => {
                    return Err(NodeError::Config(format!(
                        "duplicate {{{{ else }}}} in {{{{ if {} }}}}",
                        cond
                    )))
                }
                (_, None) => return Err(missing_end(cond)),
            },
            None => return Err(missing_end(cond)),
        };

        items.push(Item::If {
            cond,
            then,
            otherwise,
        });
    }

    Ok((items, None))
}

fn missing_end(cond: &str) -> NodeError {
    NodeError::Config(format!("missing {{{{ end }}}} for {{{{ if {} }}}}", cond))
}

fn render_items(items: &[Item<'_>], cfg: &NodeConfig, out: &mut String) -> Result<()> {
    for item in items {
        match item {
            Item::Text(text) => out.push_str(text),
            Item::Field(field) => match lookup(field, cfg)? {
                Value::Str(s) => out.push_str(&s),
                Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
                Value::Collection(_) => {
                    return Err(NodeError::Config(format!(
                        "template field {:?} is a collection and cannot be printed",
                        field
                    )))
                }
            },
            Item::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if lookup(cond, cfg)?.is_truthy() {
                    then
                } else {
                    otherwise
                };
                render_items(branch, cfg, out)?;
            }
        }
    }
    Ok(())
}

enum Value {
    Str(String),
    Bool(bool),
    /// Map or list; carries whether it has entries
    Collection(bool),
}

impl Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::Collection(non_empty) => *non_empty,
        }
    }
}

fn lookup(field: &str, cfg: &NodeConfig) -> Result<Value> {
    let field = field.strip_prefix('.').ok_or_else(|| {
        NodeError::Config(format!("template placeholder {:?} must start with '.'", field))
    })?;

    let s = |v: &String| Value::Str(v.clone());
    let value = match field {
        "ShortName" => s(&cfg.short_name),
        "LongName" => s(&cfg.long_name),
        "Kind" => s(&cfg.kind),
        "Image" => s(&cfg.image),
        "Kernel" => s(&cfg.kernel),
        "Sandbox" => s(&cfg.sandbox),
        "NetworkMode" => s(&cfg.network_mode),
        "MgmtIPv4Gateway" => s(&cfg.mgmt_ipv4_gateway),
        "MgmtIPv6Gateway" => s(&cfg.mgmt_ipv6_gateway),
        "StartupConfig" => s(&cfg.startup_config),
        "ResStartupConfig" => s(&cfg.res_startup_config),
        "LabDir" => s(&cfg.lab_dir),
        "DeploymentStatus" => s(&cfg.deployment_status),
        "IsRootNamespaceBased" => Value::Bool(cfg.is_root_namespace_based),
        "Env" => Value::Collection(!cfg.env.is_empty()),
        "Sysctls" => Value::Collection(!cfg.sysctls.is_empty()),
        "Binds" => Value::Collection(!cfg.binds.is_empty()),
        "Endpoints" => Value::Collection(!cfg.endpoints.is_empty()),
        _ => {
            if let Some(key) = field.strip_prefix("Env.") {
                Value::Str(cfg.env.get(key).cloned().unwrap_or_default())
            } else if let Some(key) = field.strip_prefix("Sysctls.") {
                Value::Str(cfg.sysctls.get(key).cloned().unwrap_or_default())
            } else {
                return Err(NodeError::Config(format!(
                    "unknown template field {:?}",
                    field
                )));
            }
        }
    };

    Ok(value)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
