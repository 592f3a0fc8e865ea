//! Structural scanner for function-like definitions in script sources.
//!
//! Recognition is two-staged: anchored regexes locate definition headers,
//! then [`find_block`] walks the text character by character to isolate the
//! body, skipping braces that live inside strings and comments. The scanner
//! never fails; broken input yields fewer or truncated definitions.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::utils::content_hash;

macro_rules! header_pattern {
    ($name:ident, $regex_str:expr) => {
        static $name: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new($regex_str).ok());
    };
}

header_pattern!(RE_FUNC_DECL, r"(?m)^\s*function\s+([A-Za-z_$][\w$]*)\s*\(");
header_pattern!(
    RE_PROTO_FUNC,
    r"(?m)^\s*([A-Za-z_$][\w$]*)\.prototype\.([A-Za-z_$][\w$]*)\s*=\s*function\s*\("
);
header_pattern!(
    RE_ASSIGN_FUNC,
    r"(?m)^\s*([A-Za-z_$][\w$]*)\.([A-Za-z_$][\w$]*)\s*=\s*function\s*\("
);
header_pattern!(
    RE_CLASS_DECL,
    r"(?m)^\s*class\s+([A-Za-z_$][\w$]*)\s*(?:extends\s+[A-Za-z_$][\w$.]*\s*)?\{"
);
header_pattern!(
    RE_CLASS_METHOD,
    r"(?m)^\s*(?:async\s+)?([A-Za-z_$][\w$]*)\s*\(([^)]*)\)\s*\{"
);

/// Header names the method shorthand pattern picks up that are not methods.
const EXCLUDED_METHOD_NAMES: &[&str] = &[
    "constructor",
    "get",
    "set",
    "static",
    "if",
    "for",
    "while",
    "switch",
    "catch",
    "with",
    "function",
    "return",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    /// `function name(...) {...}`
    Function,
    /// `Container.prototype.name = function(...) {...}`
    Prototype,
    /// `Object.name = function(...) {...}`
    Assign,
    /// `class Container { name(...) {...} }`
    Class,
}

impl DefinitionKind {
    pub fn key_prefix(self) -> &'static str {
        match self {
            DefinitionKind::Function => "function",
            DefinitionKind::Prototype => "proto",
            DefinitionKind::Assign => "assign",
            DefinitionKind::Class => "class",
        }
    }
}

/// Builds the `kind:container.name` identity of a definition.
pub fn definition_key(kind: DefinitionKind, container: Option<&str>, name: &str) -> String {
    match container {
        Some(container) => format!("{}:{container}.{name}", kind.key_prefix()),
        None => format!("{}:{name}", kind.key_prefix()),
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefinitionRecord {
    pub kind: DefinitionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub name: String,
    /// Human-readable rendering of the header. Never compared.
    #[serde(rename = "sig")]
    pub signature: String,
    pub hash: String,
    /// Body was not closed before end of text (or had no opening brace).
    #[serde(skip_serializing_if = "is_false")]
    pub truncated: bool,
    #[serde(skip)]
    pub body: String,
}

impl DefinitionRecord {
    pub fn key(&self) -> String {
        definition_key(self.kind, self.container.as_deref(), &self.name)
    }
}

/// Definitions found in one text blob, keyed by [`definition_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScanResult {
    definitions: BTreeMap<String, DefinitionRecord>,
}

impl ScanResult {
    /// Last write wins: a later definition with the same key replaces the
    /// earlier one, which is returned.
    pub fn insert(&mut self, record: DefinitionRecord) -> Option<DefinitionRecord> {
        self.definitions.insert(record.key(), record)
    }

    pub fn get(&self, key: &str) -> Option<&DefinitionRecord> {
        self.definitions.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.definitions.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DefinitionRecord)> {
        self.definitions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &DefinitionRecord) -> bool) {
        self.definitions.retain(|k, v| keep(k, v));
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Byte span of an isolated body, braces included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSpan {
    pub range: Range<usize>,
    /// The closing brace was found.
    pub terminated: bool,
}

impl BlockSpan {
    /// The span between the braces.
    pub fn interior(&self) -> Range<usize> {
        if self.range.is_empty() {
            return self.range.clone();
        }
        let end = if self.terminated {
            self.range.end - 1
        } else {
            self.range.end
        };
        self.range.start + 1..end
    }
}

/// Isolates the brace-delimited body that follows `start`.
///
/// Braces inside `//` and `/* */` comments and inside `"`, `'` and backtick
/// strings do not count. A backslash escapes exactly the next character.
/// Without any `{` after `start` the span is empty at `start`; an unclosed
/// body runs to the end of `text`.
pub fn find_block(text: &str, start_index: usize) -> BlockSpan {
    let mut start_index = start_index.min(text.len());
    while !text.is_char_boundary(start_index) {
        start_index -= 1;
    }
    let bytes = text.as_bytes();
    let Some(offset) = bytes[start_index..].iter().position(|&b| b == b'{') else {
        return BlockSpan {
            range: start_index..start_index,
            terminated: false,
        };
    };
    let brace_start = start_index + offset;

    let mut i = brace_start;
    let mut depth = 0usize;
    let mut in_str: Option<u8> = None;
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut escape = false;

    while i < bytes.len() {
        let ch = bytes[i];
        let nxt = bytes.get(i + 1).copied();
        let escaped = std::mem::take(&mut escape);

        if in_line_comment {
            if ch == b'\n' {
                in_line_comment = false;
            }
            i += 1;
            continue;
        }
        if in_block_comment {
            if ch == b'*' && nxt == Some(b'/') {
                in_block_comment = false;
                i += 2;
                continue;
            }
            i += 1;
            continue;
        }

        if let Some(delim) = in_str {
            if !escaped {
                if ch == b'\\' {
                    escape = true;
                } else if ch == delim {
                    in_str = None;
                }
            }
            i += 1;
            continue;
        }

        if escaped {
            i += 1;
            continue;
        }

        match (ch, nxt) {
            (b'\\', _) => escape = true,
            (b'/', Some(b'/')) => {
                in_line_comment = true;
                i += 2;
                continue;
            }
            (b'/', Some(b'*')) => {
                in_block_comment = true;
                i += 2;
                continue;
            }
            (b'"' | b'\'' | b'`', _) => in_str = Some(ch),
            (b'{', _) => depth += 1,
            (b'}', _) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return BlockSpan {
                        range: brace_start..i + 1,
                        terminated: true,
                    };
                }
            }
            _ => {}
        }
        i += 1;
    }

    BlockSpan {
        range: brace_start..bytes.len(),
        terminated: false,
    }
}

fn build_record(
    text: &str,
    header_start: usize,
    kind: DefinitionKind,
    container: Option<&str>,
    name: &str,
    signature: String,
) -> DefinitionRecord {
    let span = find_block(text, header_start);
    let body = &text[span.range.clone()];
    if !span.terminated {
        debug!(
            key = %definition_key(kind, container, name),
            offset = header_start,
            "body not closed before end of text"
        );
    }

    DefinitionRecord {
        kind,
        container: container.map(str::to_string),
        name: name.to_string(),
        signature,
        hash: content_hash(body),
        truncated: !span.terminated,
        body: body.to_string(),
    }
}

fn scan_function_decls(text: &str, out: &mut ScanResult) {
    let Some(re) = RE_FUNC_DECL.as_ref() else {
        return;
    };
    for caps in re.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str();
        out.insert(build_record(
            text,
            whole.start(),
            DefinitionKind::Function,
            None,
            name,
            format!("function {name}(...)"),
        ));
    }
}

fn scan_prototype_methods(text: &str, out: &mut ScanResult) {
    let Some(re) = RE_PROTO_FUNC.as_ref() else {
        return;
    };
    for caps in re.captures_iter(text) {
        let (Some(whole), Some(class), Some(name)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let (class, name) = (class.as_str(), name.as_str());
        out.insert(build_record(
            text,
            whole.start(),
            DefinitionKind::Prototype,
            Some(class),
            name,
            format!("{class}.prototype.{name} = function(...)"),
        ));
    }
}

fn scan_assigned_methods(text: &str, out: &mut ScanResult) {
    let Some(re) = RE_ASSIGN_FUNC.as_ref() else {
        return;
    };
    for caps in re.captures_iter(text) {
        let (Some(whole), Some(object), Some(name)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let (object, name) = (object.as_str(), name.as_str());
        out.insert(build_record(
            text,
            whole.start(),
            DefinitionKind::Assign,
            Some(object),
            name,
            format!("{object}.{name} = function(...)"),
        ));
    }
}

fn scan_class_methods(text: &str, out: &mut ScanResult) {
    let (Some(re_class), Some(re_method)) = (RE_CLASS_DECL.as_ref(), RE_CLASS_METHOD.as_ref())
    else {
        return;
    };
    for caps in re_class.captures_iter(text) {
        let (Some(whole), Some(class)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let class = class.as_str();
        let interior = find_block(text, whole.start()).interior();
        let class_body = &text[interior.clone()];

        for mcaps in re_method.captures_iter(class_body) {
            let (Some(mwhole), Some(name)) = (mcaps.get(0), mcaps.get(1)) else {
                continue;
            };
            let name = name.as_str();
            if EXCLUDED_METHOD_NAMES.contains(&name) {
                continue;
            }
            // A call taking an inline callback: `setTimeout(function() {`.
            let params = mcaps.get(2).map_or("", |p| p.as_str());
            if params.contains("function") || params.contains("=>") {
                continue;
            }
            out.insert(build_record(
                text,
                interior.start + mwhole.start(),
                DefinitionKind::Class,
                Some(class),
                name,
                format!("class {class} {{ {name}(...) {{...}} }}"),
            ));
        }
    }
}

/// Runs every recognition pass over `text`. Passes are independent, so one
/// span may show up under several kinds.
pub fn scan(text: &str) -> ScanResult {
    let mut result = ScanResult::default();
    scan_function_decls(text, &mut result);
    scan_prototype_methods(text, &mut result);
    scan_assigned_methods(text, &mut result);
    scan_class_methods(text, &mut result);
    debug!(definitions = result.len(), bytes = text.len(), "scan finished");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(result: &ScanResult) -> Vec<&str> {
        result.keys().collect()
    }

    fn body_of<'a>(result: &'a ScanResult, key: &str) -> &'a str {
        &result.get(key).unwrap().body
    }

    #[test]
    fn finds_free_function() {
        let result = scan("function foo(){ return 1; }");
        assert_eq!(keys(&result), ["function:foo"]);
        let rec = result.get("function:foo").unwrap();
        assert_eq!(rec.kind, DefinitionKind::Function);
        assert_eq!(rec.container, None);
        assert_eq!(rec.signature, "function foo(...)");
        assert_eq!(rec.body, "{ return 1; }");
        assert_eq!(rec.hash, content_hash("{ return 1; }"));
        assert!(!rec.truncated);
    }

    #[test]
    fn function_must_be_at_statement_position() {
        let result = scan("var f = function foo() {};\nx(function bar() {});");
        assert!(result.is_empty());
        let result = scan("var a = 1;\n   function baz(a, b) {\n  return a;\n}\n");
        assert_eq!(keys(&result), ["function:baz"]);
    }

    #[test]
    fn finds_prototype_method() {
        let result = scan("A.prototype.m = function(){ x(); }");
        assert_eq!(keys(&result), ["proto:A.m"]);
        let rec = result.get("proto:A.m").unwrap();
        assert_eq!(rec.container.as_deref(), Some("A"));
        assert_eq!(rec.signature, "A.prototype.m = function(...)");
        assert_eq!(rec.body, "{ x(); }");
    }

    #[test]
    fn finds_assigned_method() {
        let text = "Graphics.initialize = function(width, height) {\n    this._width = width;\n};\n";
        let result = scan(text);
        assert_eq!(keys(&result), ["assign:Graphics.initialize"]);
        let rec = result.get("assign:Graphics.initialize").unwrap();
        assert_eq!(rec.kind, DefinitionKind::Assign);
        assert_eq!(rec.signature, "Graphics.initialize = function(...)");
        assert_eq!(rec.body, "{\n    this._width = width;\n}");
    }

    #[test]
    fn finds_class_methods_and_skips_reserved_names() {
        let text = "\
class Sprite_Gauge extends Sprite {
    constructor() {
        super();
    }
    async load(url) {
        if (url) {
            return fetch(url);
        }
        for (const x of []) {
        }
    }
    get value() {
        return 1;
    }
    update() {
        while (true) {
        }
    }
}
";
        let result = scan(text);
        assert_eq!(
            keys(&result),
            ["class:Sprite_Gauge.load", "class:Sprite_Gauge.update"]
        );
        let rec = result.get("class:Sprite_Gauge.load").unwrap();
        assert_eq!(rec.signature, "class Sprite_Gauge { load(...) {...} }");
        assert!(rec.body.starts_with("{\n        if (url)"));
        assert!(rec.body.ends_with("}\n    }"));
    }

    #[test]
    fn class_with_dotted_parent() {
        let result = scan("class Layer extends PIXI.Container {\n  render() { draw(); }\n}\n");
        assert_eq!(keys(&result), ["class:Layer.render"]);
        assert_eq!(body_of(&result, "class:Layer.render"), "{ draw(); }");
    }

    #[test]
    fn class_method_body_ignores_brace_in_string() {
        let text = r#"class C { foo() { if (x) { return "a}b"; } } }"#;
        let result = scan(text);
        assert_eq!(keys(&result), ["class:C.foo"]);
        let body = body_of(&result, "class:C.foo");
        assert_eq!(body, r#"{ if (x) { return "a}b"; } }"#);
        assert_eq!(scan(text), result);
    }

    #[test]
    fn methods_outside_class_body_are_not_class_methods() {
        let text = "class A {\n  run() {}\n}\nstep(a) {\n}\n";
        let result = scan(text);
        assert_eq!(keys(&result), ["class:A.run"]);
    }

    #[test]
    fn passes_run_independently_over_one_text() {
        let text = "\
function Scene_Boot() {
    this.initialize(...arguments);
}

Scene_Boot.prototype.start = function() {
    Scene_Base.prototype.start.call(this);
};

SceneManager.run = function(sceneClass) {
    this.initialize();
};

class Game_Temp {
    clear() {
        this._items = [];
    }
}
";
        let result = scan(text);
        assert_eq!(
            keys(&result),
            [
                "assign:SceneManager.run",
                "class:Game_Temp.clear",
                "function:Scene_Boot",
                "proto:Scene_Boot.start",
            ]
        );
    }

    #[test]
    fn duplicate_keys_last_write_wins() {
        let text = "function f() { a(); }\nfunction f() { b(); }\n";
        let result = scan(text);
        assert_eq!(result.len(), 1);
        assert_eq!(body_of(&result, "function:f"), "{ b(); }");
        assert_eq!(result.get("function:f").unwrap().hash, content_hash("{ b(); }"));
    }

    #[test]
    fn insert_returns_overwritten_record() {
        let mut result = scan("function f() { a(); }");
        let replacement = scan("function f() { b(); }")
            .get("function:f")
            .cloned()
            .unwrap();
        let previous = result.insert(replacement).unwrap();
        assert_eq!(previous.body, "{ a(); }");
        assert_eq!(body_of(&result, "function:f"), "{ b(); }");
    }

    #[test]
    fn truncated_body_runs_to_end_of_text() {
        let text = "function foo() {\n  if (a) {\n    b();\n";
        let result = scan(text);
        let rec = result.get("function:foo").unwrap();
        assert!(rec.truncated);
        assert_eq!(rec.body, "{\n  if (a) {\n    b();\n");

        let result = scan("class C {\n  foo() {\n    x();\n");
        let rec = result.get("class:C.foo").unwrap();
        assert!(rec.truncated);
        assert_eq!(rec.body, "{\n    x();\n");
    }

    #[test]
    fn whitespace_only_reflow_keeps_hash() {
        let a = scan("A.prototype.m = function(){ x(); }");
        let b = scan("A.prototype.m = function(){\n\n        x();\n\n}");
        assert_eq!(
            a.get("proto:A.m").unwrap().hash,
            b.get("proto:A.m").unwrap().hash
        );
    }

    #[test]
    fn single_token_edit_changes_hash() {
        let a = scan("function foo(){ return 1; }");
        let b = scan("function foo(){ return 2; }");
        assert_ne!(
            a.get("function:foo").unwrap().hash,
            b.get("function:foo").unwrap().hash
        );
    }

    #[test]
    fn scan_is_idempotent() {
        let text = "function a() { b('}'); }\nX.prototype.y = function() { /* { */ };\n";
        assert_eq!(scan(text), scan(text));
    }

    #[test]
    fn empty_and_garbage_input_yield_empty_result() {
        assert!(scan("").is_empty());
        assert!(scan("}}}{{{ /* \" ' `").is_empty());
    }

    #[test]
    fn find_block_without_brace_is_empty_at_header() {
        let span = find_block("function foo()", 3);
        assert_eq!(span.range, 3..3);
        assert!(!span.terminated);
        assert_eq!(span.interior(), 3..3);
        assert_eq!(find_block("abc", 10).range, 3..3);
    }

    #[test]
    fn find_block_clamps_start_inside_multibyte_char() {
        let span = find_block("\u{e9}{}", 1);
        assert_eq!(span.range, 2..4);
        assert!(span.terminated);
        let span = find_block("a\u{e9}", 2);
        assert_eq!(span.range, 1..1);
    }

    #[test]
    fn header_without_body_gives_empty_truncated_record() {
        let result = scan("function foo()");
        let rec = result.get("function:foo").unwrap();
        assert_eq!(rec.body, "");
        assert!(rec.truncated);
        assert_eq!(rec.hash, content_hash(""));
    }

    #[test]
    fn inline_callback_call_is_not_a_class_method() {
        let text = "\
class C {
    m() {
        setTimeout(function() {
            this.tick();
        }, 10);
        load(url, () => {
        });
    }
}
";
        assert_eq!(keys(&scan(text)), ["class:C.m"]);
    }

    #[test]
    fn find_block_skips_strings() {
        let text = r#"f() { a = "}"; b = '{'; c = `}${x}`; }"#;
        let span = find_block(text, 0);
        assert!(span.terminated);
        assert_eq!(&text[span.range], r#"{ a = "}"; b = '{'; c = `}${x}`; }"#);
    }

    #[test]
    fn find_block_skips_comments() {
        let text = "f() {\n  // } closing?\n  /* { nested */ g();\n} tail }";
        let span = find_block(text, 0);
        assert_eq!(&text[span.range], "{\n  // } closing?\n  /* { nested */ g();\n}");
    }

    #[test]
    fn find_block_honours_escapes() {
        let text = r#"f() { s = "a\"}"; t = '\\'; u = 1; } rest"#;
        let span = find_block(text, 0);
        assert_eq!(&text[span.range], r#"{ s = "a\"}"; t = '\\'; u = 1; }"#);
    }

    #[test]
    fn find_block_multiline_template_string() {
        let text = "f() {\n  const t = `line {\n  still string }\n`;\n  done();\n}\n}";
        let span = find_block(text, 0);
        assert!(span.terminated);
        assert!(text[span.range.clone()].ends_with("done();\n}"));
        assert_eq!(span.range.end, text.len() - 2);
    }

    #[test]
    fn find_block_handles_multibyte_text() {
        let text = "function f() { s = \"é}ü\"; // ➜ }\n}";
        let span = find_block(text, 0);
        assert!(span.terminated);
        assert_eq!(span.range.end, text.len());
    }

    #[test]
    fn record_serializes_without_body() {
        let result = scan("A.prototype.m = function(){ x(); }");
        let json = serde_json::to_value(result.get("proto:A.m").unwrap()).unwrap();
        assert_eq!(json["kind"], "prototype");
        assert_eq!(json["container"], "A");
        assert_eq!(json["name"], "m");
        assert_eq!(json["sig"], "A.prototype.m = function(...)");
        assert!(json.get("body").is_none());
        assert!(json.get("truncated").is_none());
    }
}
