use std::fmt;

use serde::{Deserialize, Serialize};

use crate::BuildError;

/// Values substituted into command templates.
#[derive(Clone, Debug, Default)]
pub struct TemplateVars<'a> {
    pub module: Option<&'a str>,
    pub test: Option<&'a str>,
    pub benchmark: Option<&'a str>,
    pub output: Option<&'a str>,
}

/// An argv with `{module}`, `{test}`, `{benchmark}` and `{output}` placeholders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(pub Vec<String>);

impl CommandTemplate {
    pub fn new<S: Into<String>>(argv: impl IntoIterator<Item = S>) -> Self {
        Self(argv.into_iter().map(Into::into).collect())
    }

    /// Substitute placeholders. A placeholder without a value, or an unknown
    /// one, is an error. An argument that is exactly `{module}` is dropped when
    /// the module is the root (empty string).
    pub fn render(&self, vars: &TemplateVars<'_>) -> Result<Vec<String>, BuildError> {
        if self.0.is_empty() {
            return Err(BuildError::Template("empty command template".into()));
        }
        let mut out = Vec::with_capacity(self.0.len());
        for arg in &self.0 {
            if arg == "{module}" && vars.module == Some("") {
                continue;
            }
            out.push(render_arg(arg, vars)?);
        }
        Ok(out)
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

fn render_arg(arg: &str, vars: &TemplateVars<'_>) -> Result<String, BuildError> {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| BuildError::Template(format!("unclosed placeholder in `{arg}`")))?;
        let name = &after[..close];
        let value = match name {
            "module" => vars.module,
            "test" => vars.test,
            "benchmark" => vars.benchmark,
            "output" => vars.output,
            other => return Err(BuildError::Template(format!("unknown placeholder `{{{other}}}` in `{arg}`"))),
        };
        let value = value.ok_or_else(|| BuildError::Template(format!("no value for `{{{name}}}` in `{arg}`")))?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
