//! Emission engine
//!
//! Every symbol goes through a [`Sink`], which writes it to both output
//! streams at once:
//!
//! ```text
//! header:  #define DT_<PRIMARY padded>  <value>
//!          #define DT_<ALIAS padded>    DT_<PRIMARY>
//! conf:    DT_<PRIMARY>=<value>
//!          DT_<ALIAS>=<value>
//! ```
//!
//! Initializer values (`{...}`) only make sense to a C preprocessor and are
//! left out of the conf stream.

use std::collections::HashMap;
use std::io::Write;
use tracing::{debug, trace};

use crate::error::GenError;
use crate::ident::{hex, quote};
use crate::model::NodeId;
use crate::options::GenOptions;

/// A value to be rendered into both streams
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Uint(u64),
    /// Rendered as `0x...`
    Hex(u64),
    /// Rendered quoted and escaped
    Str(String),
    /// Already rendered text, written as-is
    Token(String),
    /// `{e1, e2, ...}` of already rendered elements
    Init(Vec<String>),
}

impl Value {
    /// Presence flag
    pub const FLAG: Value = Value::Int(1);

    pub fn render(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Uint(v) => v.to_string(),
            Value::Hex(v) => hex(*v),
            Value::Str(s) => quote(s),
            Value::Token(t) => t.clone(),
            Value::Init(elems) => format!("{{{}}}", elems.join(", ")),
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Uint(v as u64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

/// Facts whose first rendering is reused by later naming schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fact {
    RegAddress(usize),
    RegSize(usize),
}

#[derive(Debug, Clone)]
struct Definition {
    value: String,
    /// Header line the primary was written on
    line: usize,
}

/// Both output streams plus the per-run symbol table and fact memo
pub struct Sink<W: Write> {
    header: W,
    conf: W,
    prefix: String,
    name_width: usize,
    header_lines: usize,
    symbols: HashMap<String, Definition>,
    /// Alias name -> value it stands for; shares a namespace with `symbols`
    aliases: HashMap<String, Definition>,
    memo: HashMap<(NodeId, Fact), String>,
}

impl<W: Write> Sink<W> {
    pub fn new(header: W, conf: W, options: &GenOptions) -> Self {
        Self {
            header,
            conf,
            prefix: options.prefix.clone(),
            name_width: options.name_width,
            header_lines: 0,
            symbols: HashMap::new(),
            aliases: HashMap::new(),
            memo: HashMap::new(),
        }
    }

    /// Global symbol prefix, e.g. `DT_`
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Write `ident = value` plus `aliases` pointing at it.
    ///
    /// Returns the canonical symbol (`<prefix><ident>`). Re-emitting an
    /// existing name, primary or alias, with the same value is a no-op; with
    /// a different value it is an error.
    pub fn emit(
        &mut self,
        ident: &str,
        value: &Value,
        aliases: &[String],
        deprecation: Option<&str>,
    ) -> Result<String, GenError> {
        let rendered = value.render();
        let symbol = format!("{}{}", self.prefix, ident);

        if self.check_unique(ident, &rendered)? {
            self.define(ident, None, &rendered)?;
            if in_conf(&rendered) {
                writeln!(self.conf, "{symbol}={rendered}")?;
            }
            trace!(symbol = %symbol, value = %rendered, "Defined");
            self.symbols.insert(
                ident.to_string(),
                Definition {
                    value: rendered.clone(),
                    line: self.header_lines,
                },
            );
        }

        self.write_aliases(ident, &symbol, &rendered, aliases, deprecation)?;
        Ok(symbol)
    }

    /// Add aliases to an already emitted primary
    pub fn alias(
        &mut self,
        ident: &str,
        aliases: &[String],
        deprecation: Option<&str>,
    ) -> Result<String, GenError> {
        let symbol = format!("{}{}", self.prefix, ident);
        let rendered = self
            .previous(ident)
            .map(|def| def.value.clone())
            .ok_or_else(|| GenError::UndefinedSymbol(symbol.clone()))?;
        self.write_aliases(ident, &symbol, &rendered, aliases, deprecation)?;
        Ok(symbol)
    }

    fn write_aliases(
        &mut self,
        ident: &str,
        symbol: &str,
        rendered: &str,
        aliases: &[String],
        deprecation: Option<&str>,
    ) -> Result<(), GenError> {
        for alias in aliases {
            if alias == ident || !self.check_unique(alias, rendered)? {
                continue;
            }

            self.define(alias, deprecation, symbol)?;
            if in_conf(rendered) {
                writeln!(self.conf, "{}{}={}", self.prefix, alias, rendered)?;
            }
            self.aliases.insert(
                alias.clone(),
                Definition {
                    value: rendered.to_string(),
                    line: self.header_lines,
                },
            );
        }
        Ok(())
    }

    /// Existing definition of `name`, as a primary or as an alias
    fn previous(&self, name: &str) -> Option<&Definition> {
        self.symbols.get(name).or_else(|| self.aliases.get(name))
    }

    /// `Ok(true)` if `name` is still free, `Ok(false)` if it already holds
    /// `rendered`.
    fn check_unique(&self, name: &str, rendered: &str) -> Result<bool, GenError> {
        match self.previous(name) {
            None => Ok(true),
            Some(def) if def.value == rendered => {
                debug!(
                    symbol = %format!("{}{}", self.prefix, name),
                    "Skipping duplicate definition"
                );
                Ok(false)
            }
            Some(def) => Err(GenError::ConflictingDefinition {
                symbol: format!("{}{}", self.prefix, name),
                previous: def.value.clone(),
                value: rendered.to_string(),
                line: def.line,
            }),
        }
    }

    fn define(
        &mut self,
        ident: &str,
        deprecation: Option<&str>,
        value: &str,
    ) -> Result<(), GenError> {
        let mut line = format!(
            "#define {}{:<width$}",
            self.prefix,
            ident,
            width = self.name_width
        );
        if let Some(note) = deprecation {
            line.push_str(&format!(" __WARN(\"{note}\")"));
        }
        line.push(' ');
        line.push_str(value);
        self.header_line(&line)
    }

    /// Write `text` as a comment to both streams.
    ///
    /// Multi-line text becomes a `/* ... */` block with ` * ` markers in the
    /// header and `# `-prefixed lines in the conf file. Blank lines carry no
    /// trailing space.
    pub fn comment(&mut self, text: &str, blank_before: bool) -> Result<(), GenError> {
        if blank_before {
            self.header_line("")?;
            writeln!(self.conf)?;
        }

        if text.contains('\n') {
            let mut block = vec!["/*".to_string()];
            for line in text.lines() {
                if line.trim().is_empty() {
                    block.push(" *".to_string());
                } else {
                    block.push(format!(" * {line}"));
                }
            }
            block.push(" */".to_string());
            self.header_line(&block.join("\n"))?;
        } else {
            self.header_line(&format!("/* {text} */"))?;
        }

        let conf: Vec<String> = text
            .lines()
            .map(|line| {
                if line.trim().is_empty() {
                    "#".to_string()
                } else {
                    format!("# {line}")
                }
            })
            .collect();
        writeln!(self.conf, "{}", conf.join("\n"))?;
        Ok(())
    }

    fn header_line(&mut self, text: &str) -> Result<(), GenError> {
        writeln!(self.header, "{text}")?;
        self.header_lines += text.matches('\n').count() + 1;
        Ok(())
    }

    /// Number of distinct symbols written so far, aliases included
    pub fn defined(&self) -> usize {
        self.symbols.len() + self.aliases.len()
    }

    /// First rendering of `fact` for `node`, if any naming scheme produced it
    pub fn recall(&self, node: NodeId, fact: Fact) -> Option<&str> {
        self.memo.get(&(node, fact)).map(String::as_str)
    }

    pub fn remember(&mut self, node: NodeId, fact: Fact, rendered: String) {
        self.memo.entry((node, fact)).or_insert(rendered);
    }

    /// Flush both streams and hand them back
    pub fn finish(mut self) -> Result<(W, W), GenError> {
        self.header.flush()?;
        self.conf.flush()?;
        Ok((self.header, self.conf))
    }
}

fn in_conf(rendered: &str) -> bool {
    !rendered.starts_with('{')
}
