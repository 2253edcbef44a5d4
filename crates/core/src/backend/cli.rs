//! CLI backend: the help blob and option table embedded in the native
//! command-line client, a bash completion script and a JSON description of
//! the same options.

use rpcgen_common::sanitize_c_identifier;
use serde::Serialize;
use serde_json::{Value, json};

use super::{Backend, FileSet, GENERATED_BANNER, pretty_json, render_template};
use crate::emit::c::{CItem, c_str};
use crate::emit::{CFile, Emit};
use crate::error::Result;
use crate::model::ConfigOption;
use crate::resolved::{ResolvedMethod, ResolvedModel};

const COMPLETION_TEMPLATE: &str = r#"# {{ banner }}

_{{ func }}() {
    local cur prev
    cur="${COMP_WORDS[COMP_CWORD]}"
    prev="${COMP_WORDS[COMP_CWORD-1]}"

    case "$prev" in
{% for o in valued %}        {{ o.pattern }})
            COMPREPLY=( $(compgen -W "{{ o.values }}" -- "$cur") )
            return 0
            ;;
{% endfor %}    esac

    if [[ "$cur" == -* ]]; then
        COMPREPLY=( $(compgen -W "{{ flags }}" -- "$cur") )
        return 0
    fi

    COMPREPLY=( $(compgen -W "{{ methods }}" -- "$cur") )
}

complete -F _{{ func }} {{ program }}
"#;

const HELP_COLUMN: usize = 28;

/// Emits `cli/cli_help.h`, `cli/completion.bash` and `cli/options.json`.
#[derive(Debug, Clone)]
pub struct CliBackend {
    program: String,
}

#[derive(Debug, Serialize)]
struct ValuedOption {
    pattern: String,
    values: String,
}

fn flags(name: &str, option: &ConfigOption) -> Vec<String> {
    let mut flags = vec![format!("--{name}")];
    if let Some(alias) = &option.alias {
        flags.push(format!("-{alias}"));
    }
    flags
}

fn default_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn c_str_or_null(value: Option<&str>) -> String {
    value.map_or_else(|| "NULL".to_string(), c_str)
}

impl CliBackend {
    /// Backend for the program `program`.
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    fn symbol(&self) -> String {
        sanitize_c_identifier(&self.program)
    }

    fn methods(model: &ResolvedModel) -> Vec<&ResolvedMethod> {
        model.methods().filter(|m| !m.skip_generate).collect()
    }

    /// Plain-text help shown by `<program> --help`.
    pub fn help_text(&self, model: &ResolvedModel) -> String {
        let mut out = format!("Usage: {} [options] <method> [params...]\n", self.program);
        if !model.config.is_empty() {
            out.push_str("\nOptions:\n");
            for (name, option) in &model.config {
                let head = format!("  {} <{}>", flags(name, option).join(", "), option.ty);
                let mut details = Vec::new();
                if let Some(default) = &option.default {
                    details.push(format!("default: {}", default_text(default)));
                }
                if let Some(env) = &option.env {
                    details.push(format!("env: {env}"));
                }
                if !option.values.is_empty() {
                    details.push(format!("values: {}", option.values.join("|")));
                }
                let mut text = option.descr.trim().replace('\n', " ");
                if !details.is_empty() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(&format!("({})", details.join(", ")));
                }
                out.push_str(&pad_line(&head, &text));
            }
        }
        let methods = Self::methods(model);
        if !methods.is_empty() {
            out.push_str("\nMethods:\n");
            for method in methods {
                let summary = method.descr.lines().next().unwrap_or_default().trim();
                out.push_str(&pad_line(&format!("  {}", method.name), summary));
            }
        }
        out
    }

    fn help_header(&self, model: &ResolvedModel) -> String {
        let symbol = self.symbol();
        let mut items = vec![CItem::Raw(format!(
            "typedef struct {{\n  const char* name;\n  const char* flag;\n  const char* type;\n  const char* env;\n  const char* descr;\n}} {symbol}_cli_option_t;"
        ))];

        let mut options = format!("static const {symbol}_cli_option_t {symbol}_cli_options[] = {{\n");
        for (name, option) in &model.config {
            options.push_str(&format!(
                "  {{{}, {}, {}, {}, {}}},\n",
                c_str(name),
                c_str_or_null(option.alias.as_deref()),
                c_str(&option.ty),
                c_str_or_null(option.env.as_deref()),
                c_str(option.descr.trim())
            ));
        }
        options.push_str("  {NULL, NULL, NULL, NULL, NULL},\n};");
        items.push(CItem::Raw(options));

        let mut methods = format!("static const char* const {symbol}_cli_methods[] = {{\n");
        for method in Self::methods(model) {
            methods.push_str(&format!("  {},\n", c_str(&method.name)));
        }
        methods.push_str("  NULL,\n};");
        items.push(CItem::Raw(methods));

        let mut help = format!("static const char {symbol}_cli_help[] =\n");
        let text = self.help_text(model);
        let lines: Vec<&str> = text.lines().collect();
        for (i, line) in lines.iter().enumerate() {
            let end = if i + 1 == lines.len() { ";" } else { "" };
            help.push_str(&format!("  {}{end}\n", c_str(&format!("{line}\n"))));
        }
        items.push(CItem::Raw(help));

        CFile {
            guard: Some(format!("{}_CLI_HELP_H", symbol.to_ascii_uppercase())),
            banner: GENERATED_BANNER.to_string(),
            includes: vec!["<stddef.h>".into()],
            items,
        }
        .emit()
    }

    fn completion(&self, model: &ResolvedModel) -> Result<String> {
        let valued: Vec<ValuedOption> = model
            .config
            .iter()
            .filter(|(_, option)| !option.values.is_empty())
            .map(|(name, option)| ValuedOption {
                pattern: flags(name, option).join("|"),
                values: option.values.join(" "),
            })
            .collect();
        let all_flags: Vec<String> = model
            .config
            .iter()
            .flat_map(|(name, option)| flags(name, option))
            .chain(std::iter::once("--help".to_string()))
            .collect();
        let methods: Vec<&str> = Self::methods(model).iter().map(|m| m.name.as_str()).collect();
        render_template(
            "cli/completion.bash",
            COMPLETION_TEMPLATE,
            &json!({
                "banner": GENERATED_BANNER,
                "func": self.symbol(),
                "program": self.program,
                "valued": valued,
                "flags": all_flags.join(" "),
                "methods": methods.join(" "),
            }),
        )
    }

    fn options_json(&self, model: &ResolvedModel) -> String {
        let options: Vec<Value> = model
            .config
            .iter()
            .map(|(name, option)| {
                json!({
                    "name": name,
                    "type": option.ty,
                    "descr": option.descr.trim(),
                    "default": option.default,
                    "env": option.env,
                    "values": option.values,
                    "alias": option.alias,
                })
            })
            .collect();
        let methods: Vec<Value> = Self::methods(model)
            .iter()
            .map(|m| {
                let params: Vec<Value> = m
                    .params
                    .iter()
                    .map(|p| json!({"name": p.name, "type": p.type_label(), "optional": p.optional}))
                    .collect();
                json!({"name": m.name, "descr": m.descr.trim(), "params": params})
            })
            .collect();
        pretty_json(&json!({
            "program": self.program,
            "options": options,
            "methods": methods,
        }))
    }
}

fn pad_line(head: &str, text: &str) -> String {
    if text.is_empty() {
        return format!("{head}\n");
    }
    if head.len() + 2 > HELP_COLUMN {
        return format!("{head}\n{}{text}\n", " ".repeat(HELP_COLUMN));
    }
    format!("{head:<width$}{text}\n", width = HELP_COLUMN)
}

impl Backend for CliBackend {
    fn name(&self) -> &'static str {
        "cli"
    }

    fn emit(&self, model: &ResolvedModel) -> Result<FileSet> {
        let mut files = FileSet::new();
        files.insert("cli/cli_help.h", self.help_header(model));
        files.insert("cli/completion.bash", self.completion(model)?);
        files.insert("cli/options.json", self.options_json(model));
        Ok(files)
    }
}
