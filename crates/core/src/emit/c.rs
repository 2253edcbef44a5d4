//! C syntax tree and its text emission.
//!
//! The struct and RPC emitters build these nodes; `Emit` turns them into
//! source text. Indentation is two spaces per level.

use rpcgen_common::escape_c_string;

/// Trait for emitting C source from syntax nodes.
pub trait Emit {
    /// Convert the node to its C source representation.
    fn emit(&self) -> String;
}

// =============================================================================
// Types
// =============================================================================

/// Native value representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CType {
    /// `bool`
    Bool,
    /// `uint32_t`
    U32,
    /// `int32_t`
    I32,
    /// `uint64_t`
    U64,
    /// `int64_t`
    I64,
    /// `double`
    Double,
    /// `bytes_t`: length-prefixed buffer
    Bytes,
    /// `const char*`
    Str,
    /// `json_t`: unvalidated JSON token
    Json,
    /// `uint8_t[20]`
    Address,
    /// A generated struct typedef, `Tx_t`
    Named(String),
    /// Pointer to another type
    Ptr(Box<CType>),
}

impl CType {
    /// Declarator for a scalar of this type: `uint8_t name[20]`, `Tx_t* name`.
    pub fn declare(&self, name: &str) -> String {
        match self {
            CType::Address => format!("uint8_t {name}[20]"),
            other => format!("{} {name}", other.emit()),
        }
    }

    /// Declarator for a heap array of this type (paired with a `<name>_len`).
    pub fn declare_array(&self, name: &str) -> String {
        match self {
            CType::Address => format!("uint8_t (*{name})[20]"),
            other => format!("{}* {name}", other.emit()),
        }
    }

    /// Zero initializer usable in a declaration.
    pub fn zero(&self) -> &'static str {
        match self {
            CType::Bool => "false",
            CType::U32 | CType::I32 | CType::U64 | CType::I64 => "0",
            CType::Double => "0.0",
            CType::Str | CType::Ptr(_) => "NULL",
            CType::Bytes | CType::Json | CType::Address | CType::Named(_) => "{0}",
        }
    }

    /// Whether the value is passed to callees by address.
    pub fn by_reference(&self) -> bool {
        matches!(self, CType::Named(_))
    }
}

impl Emit for CType {
    fn emit(&self) -> String {
        match self {
            CType::Bool => "bool".to_string(),
            CType::U32 => "uint32_t".to_string(),
            CType::I32 => "int32_t".to_string(),
            CType::U64 => "uint64_t".to_string(),
            CType::I64 => "int64_t".to_string(),
            CType::Double => "double".to_string(),
            CType::Bytes => "bytes_t".to_string(),
            CType::Str => "const char*".to_string(),
            CType::Json => "json_t".to_string(),
            CType::Address => "uint8_t*".to_string(),
            CType::Named(name) => name.clone(),
            CType::Ptr(inner) => format!("{}*", inner.emit()),
        }
    }
}

// =============================================================================
// Statements
// =============================================================================

/// One `case` arm of a switch. A trailing `break;` is added on emission.
#[derive(Debug, Clone)]
pub struct CCase {
    /// Case label expression.
    pub label: String,
    /// Arm body.
    pub body: Vec<CStmt>,
}

/// C statement.
#[derive(Debug, Clone)]
pub enum CStmt {
    /// `type name = init;`
    Decl {
        /// Full declarator, see [`CType::declare`].
        declarator: String,
        /// Initializer.
        init: Option<String>,
    },
    /// `expr;`
    Expr(String),
    /// `if (cond) { .. } else { .. }`
    If {
        /// Condition.
        cond: String,
        /// Then branch.
        then_body: Vec<CStmt>,
        /// Else branch.
        else_body: Option<Vec<CStmt>>,
    },
    /// `head { body }`, used for loops.
    Block {
        /// Loop header, `for (..)`.
        head: String,
        /// Loop body.
        body: Vec<CStmt>,
    },
    /// `switch (expr) { case ..: }`
    Switch {
        /// Scrutinee.
        expr: String,
        /// Arms, in order.
        cases: Vec<CCase>,
    },
    /// `RPC_THROW(ctx, "msg");`
    Throw(String),
    /// `return expr;`
    Return(Option<String>),
    /// `continue;`
    Continue,
    /// `/* text */`
    Comment(String),
    /// Preprocessor line, always at column zero.
    Preproc(String),
    /// Code emitted as-is, each line indented.
    Raw(String),
}

impl Emit for CStmt {
    fn emit(&self) -> String {
        self.emit_indented(1)
    }
}

impl CStmt {
    /// Shorthand for a single-statement `if` with a throw.
    pub fn throw_if(cond: impl Into<String>, message: impl Into<String>) -> Self {
        CStmt::If {
            cond: cond.into(),
            then_body: vec![CStmt::Throw(message.into())],
            else_body: None,
        }
    }

    /// Emit with specified indentation level (2 spaces per level)
    pub fn emit_indented(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        match self {
            CStmt::Decl { declarator, init } => match init {
                Some(init) => format!("{prefix}{declarator} = {init};\n"),
                None => format!("{prefix}{declarator};\n"),
            },
            CStmt::Expr(expr) => format!("{prefix}{expr};\n"),
            CStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                // single throw stays on one line
                if let ([CStmt::Throw(msg)], None) = (then_body.as_slice(), else_body) {
                    return format!(
                        "{prefix}if ({cond}) RPC_THROW(ctx, \"{}\");\n",
                        escape_c_string(msg)
                    );
                }
                let mut output = format!("{prefix}if ({cond}) {{\n");
                for stmt in then_body {
                    output.push_str(&stmt.emit_indented(indent + 1));
                }
                if let Some(else_stmts) = else_body {
                    output.push_str(&format!("{prefix}}} else {{\n"));
                    for stmt in else_stmts {
                        output.push_str(&stmt.emit_indented(indent + 1));
                    }
                }
                output.push_str(&format!("{prefix}}}\n"));
                output
            }
            CStmt::Block { head, body } => {
                let mut output = format!("{prefix}{head} {{\n");
                for stmt in body {
                    output.push_str(&stmt.emit_indented(indent + 1));
                }
                output.push_str(&format!("{prefix}}}\n"));
                output
            }
            CStmt::Switch { expr, cases } => {
                let mut output = format!("{prefix}switch ({expr}) {{\n");
                for case in cases {
                    output.push_str(&format!("{prefix}  case {}:\n", case.label));
                    for stmt in &case.body {
                        output.push_str(&stmt.emit_indented(indent + 2));
                    }
                    output.push_str(&format!("{prefix}    break;\n"));
                }
                output.push_str(&format!("{prefix}}}\n"));
                output
            }
            CStmt::Throw(msg) => {
                format!("{prefix}RPC_THROW(ctx, \"{}\");\n", escape_c_string(msg))
            }
            CStmt::Return(expr) => match expr {
                Some(e) => format!("{prefix}return {e};\n"),
                None => format!("{prefix}return;\n"),
            },
            CStmt::Continue => format!("{prefix}continue;\n"),
            CStmt::Comment(text) => format!("{prefix}/* {text} */\n"),
            CStmt::Preproc(line) => format!("{line}\n"),
            CStmt::Raw(code) => code
                .lines()
                .map(|line| {
                    if line.is_empty() {
                        "\n".to_string()
                    } else {
                        format!("{prefix}{line}\n")
                    }
                })
                .collect(),
        }
    }
}

// =============================================================================
// Items
// =============================================================================

/// Function definition.
#[derive(Debug, Clone)]
pub struct CFunction {
    /// Doc comment placed above the definition.
    pub doc: Option<String>,
    /// `static` linkage.
    pub is_static: bool,
    /// Return type.
    pub ret: String,
    /// Function name.
    pub name: String,
    /// Full parameter declarators.
    pub params: Vec<String>,
    /// Body statements.
    pub body: Vec<CStmt>,
}

impl CFunction {
    /// `ret name(params)` without body.
    pub fn signature(&self) -> String {
        let params = if self.params.is_empty() {
            "void".to_string()
        } else {
            self.params.join(", ")
        };
        format!("{} {}({})", self.ret, self.name, params)
    }

    /// Prototype for a header.
    pub fn prototype(&self) -> String {
        let mut output = String::new();
        if let Some(doc) = &self.doc {
            output.push_str(&doc_comment(doc, ""));
        }
        output.push_str(&format!("{};\n", self.signature()));
        output
    }
}

impl Emit for CFunction {
    fn emit(&self) -> String {
        let mut output = String::new();
        if let Some(doc) = &self.doc {
            output.push_str(&doc_comment(doc, ""));
        }
        if self.is_static {
            output.push_str("static ");
        }
        output.push_str(&self.signature());
        output.push_str(" {\n");
        for stmt in &self.body {
            output.push_str(&stmt.emit_indented(1));
        }
        output.push_str("}\n");
        output
    }
}

/// Struct definition with its forward typedef.
#[derive(Debug, Clone)]
pub struct CStruct {
    /// Doc comment.
    pub doc: Option<String>,
    /// Typedef name, `Tx_t`; the tag is `Tx_s`.
    pub name: String,
    /// Member declarators with optional trailing comment.
    pub fields: Vec<(String, Option<String>)>,
}

impl CStruct {
    /// Struct tag, `Tx_s` for `Tx_t`.
    pub fn tag(&self) -> String {
        format!("{}_s", self.name.trim_end_matches("_t"))
    }

    /// `typedef struct Tx_s Tx_t;`
    pub fn forward(&self) -> String {
        format!("typedef struct {} {};\n", self.tag(), self.name)
    }
}

impl Emit for CStruct {
    fn emit(&self) -> String {
        let mut output = String::new();
        if let Some(doc) = &self.doc {
            output.push_str(&doc_comment(doc, ""));
        }
        output.push_str(&format!("struct {} {{\n", self.tag()));
        if self.fields.is_empty() {
            output.push_str("  uint8_t _unused;\n");
        }
        for (decl, comment) in &self.fields {
            match comment {
                Some(c) if !c.is_empty() => {
                    output.push_str(&format!("  {decl}; /* {} */\n", c.replace("*/", "* /")));
                }
                _ => output.push_str(&format!("  {decl};\n")),
            }
        }
        output.push_str("};\n");
        output
    }
}

/// Top-level item of a C file.
#[derive(Debug, Clone)]
pub enum CItem {
    /// Struct definition.
    Struct(CStruct),
    /// Function definition.
    Function(CFunction),
    /// Function prototype.
    Prototype(CFunction),
    /// Verbatim text.
    Raw(String),
}

impl Emit for CItem {
    fn emit(&self) -> String {
        match self {
            CItem::Struct(s) => s.emit(),
            CItem::Function(f) => f.emit(),
            CItem::Prototype(f) => f.prototype(),
            CItem::Raw(text) => {
                if text.ends_with('\n') {
                    text.clone()
                } else {
                    format!("{text}\n")
                }
            }
        }
    }
}

/// A generated header or source file.
#[derive(Debug, Clone, Default)]
pub struct CFile {
    /// Include-guard macro for headers.
    pub guard: Option<String>,
    /// Banner comment.
    pub banner: String,
    /// `#include` targets, quoted or angled as given.
    pub includes: Vec<String>,
    /// Items separated by blank lines.
    pub items: Vec<CItem>,
}

impl Emit for CFile {
    fn emit(&self) -> String {
        let mut output = format!("/* {} */\n\n", self.banner);
        if let Some(guard) = &self.guard {
            output.push_str(&format!("#ifndef {guard}\n#define {guard}\n\n"));
        }
        for include in &self.includes {
            output.push_str(&format!("#include {include}\n"));
        }
        if !self.includes.is_empty() {
            output.push('\n');
        }
        if self.guard.is_some() {
            output.push_str("#ifdef __cplusplus\nextern \"C\" {\n#endif\n\n");
        }
        for item in &self.items {
            output.push_str(&item.emit());
            output.push('\n');
        }
        if let Some(guard) = &self.guard {
            output.push_str("#ifdef __cplusplus\n}\n#endif\n\n");
            output.push_str(&format!("#endif /* {guard} */\n"));
        }
        output
    }
}

fn doc_comment(doc: &str, prefix: &str) -> String {
    let mut output = format!("{prefix}/**\n");
    for line in doc.lines() {
        let line = line.replace("*/", "* /");
        if line.is_empty() {
            output.push_str(&format!("{prefix} *\n"));
        } else {
            output.push_str(&format!("{prefix} * {line}\n"));
        }
    }
    output.push_str(&format!("{prefix} */\n"));
    output
}

/// C string literal, quoted and escaped.
pub fn c_str(s: &str) -> String {
    format!("\"{}\"", escape_c_string(s))
}
