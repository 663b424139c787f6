//! tree-sitter front end producing the [`Module`] model.

use anyhow::anyhow;
use std::path::Path;
use tree_sitter::Node;

use super::ast::{
    Annotation, Body, Compound, ForLoop, Fragment, FunctionDef, Iterable, Module, Param, Stmt,
};
use crate::error::OptimizeError;

/// Python parser backed by tree-sitter-python
pub struct PythonParser {
    parser: tree_sitter::Parser,
}

impl PythonParser {
    pub fn new() -> anyhow::Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| anyhow!("Failed to set Python language: {}", e))?;

        Ok(Self { parser })
    }

    /// Parse `source`; any syntax error rejects the whole file.
    pub fn parse(&mut self, path: &Path, source: &str) -> Result<Module, OptimizeError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| OptimizeError::Parse {
                path: path.to_path_buf(),
                line: 1,
                column: 1,
            })?;

        let root = tree.root_node();
        if let Some(bad) = first_error(root).or_else(|| first_legacy_statement(root)) {
            let point = bad.start_position();
            return Err(OptimizeError::Parse {
                path: path.to_path_buf(),
                line: point.row + 1,
                column: point.column + 1,
            });
        }

        Lowering { source, path }.module(root)
    }
}

/// Parse one file with a fresh parser.
pub fn parse_module(path: &Path, source: &str) -> Result<Module, OptimizeError> {
    let mut parser = PythonParser::new().map_err(|e| OptimizeError::Rewrite {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parser.parse(path, source)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error(child) {
            return Some(found);
        }
    }
    Some(node)
}

/// Python 2 statement forms the grammar still accepts (`print "x"`,
/// `exec "code"`). Python 3 rejects them.
const LEGACY_STATEMENTS: &[&str] = &["print_statement", "exec_statement"];

fn first_legacy_statement(node: Node<'_>) -> Option<Node<'_>> {
    if LEGACY_STATEMENTS.contains(&node.kind()) {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    children.into_iter().find_map(first_legacy_statement)
}

struct Lowering<'s> {
    source: &'s str,
    path: &'s Path,
}

impl<'s> Lowering<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        &self.source[node.start_byte()..node.end_byte()]
    }

    fn slice(&self, start: usize, end: usize) -> &'s str {
        &self.source[start..end]
    }

    fn fail(&self, message: impl Into<String>) -> OptimizeError {
        OptimizeError::Rewrite {
            path: self.path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Whitespace in front of `byte` on its line.
    fn line_indent(&self, byte: usize) -> String {
        let line_start = self.source[..byte].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let prefix = &self.source[line_start..byte];
        if prefix.chars().all(|c| c == ' ' || c == '\t') {
            prefix.to_string()
        } else {
            " ".repeat(prefix.chars().count())
        }
    }

    fn module(&self, root: Node<'_>) -> Result<Module, OptimizeError> {
        let mut body = Vec::new();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            if child.kind() == "comment" {
                continue;
            }
            body.push(self.statement(child)?);
        }
        Ok(Module { body })
    }

    fn statement(&self, node: Node<'_>) -> Result<Stmt, OptimizeError> {
        match node.kind() {
            "import_statement" | "future_import_statement" => {
                Ok(Stmt::Import(self.text(node).trim_end().to_string()))
            }
            "import_from_statement" => {
                Ok(Stmt::ImportFrom(self.text(node).trim_end().to_string()))
            }
            "function_definition" => Ok(Stmt::FunctionDef(self.function(node, node, Vec::new())?)),
            "decorated_definition" => self.decorated(node),
            "for_statement" => Ok(Stmt::For(self.for_loop(node))),
            _ => self.compound(node),
        }
    }

    fn decorated(&self, node: Node<'_>) -> Result<Stmt, OptimizeError> {
        let definition = node
            .child_by_field_name("definition")
            .ok_or_else(|| self.fail("decorated statement without a definition"))?;

        if definition.kind() != "function_definition" {
            return self.compound(node);
        }

        let mut decorators = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "decorator" {
                continue;
            }
            let mut inner = child.walk();
            let expr = child
                .named_children(&mut inner)
                .find(|n| n.kind() != "comment")
                .map(|n| self.text(n).to_string())
                .unwrap_or_default();
            decorators.push(expr);
        }

        Ok(Stmt::FunctionDef(self.function(node, definition, decorators)?))
    }

    /// `stmt` is the full statement (the decorated definition when there is
    /// one), `def_node` the `function_definition` itself.
    fn function(
        &self,
        stmt: Node<'_>,
        def_node: Node<'_>,
        decorators: Vec<String>,
    ) -> Result<FunctionDef, OptimizeError> {
        let name = def_node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .ok_or_else(|| self.fail("function without a name"))?;
        let params_node = def_node
            .child_by_field_name("parameters")
            .ok_or_else(|| self.fail(format!("function '{}' has no parameter list", name)))?;
        let block = def_node
            .child_by_field_name("body")
            .ok_or_else(|| self.fail(format!("function '{}' has no body", name)))?;

        let mut is_async = false;
        let mut colon_end = None;
        let mut cursor = def_node.walk();
        for child in def_node.children(&mut cursor) {
            match child.kind() {
                "async" => is_async = true,
                ":" if child.end_byte() <= block.start_byte() => colon_end = Some(child.end_byte()),
                _ => {}
            }
        }
        let colon_end =
            colon_end.ok_or_else(|| self.fail(format!("function '{}' header has no ':'", name)))?;

        let mut block_cursor = block.walk();
        let first = block
            .named_children(&mut block_cursor)
            .find(|n| n.kind() != "comment")
            .ok_or_else(|| self.fail(format!("function '{}' has an empty body", name)))?;

        let leading = self.slice(colon_end, first.start_byte());
        let inline = !leading.contains('\n');

        let body = Body {
            inline,
            outer_indent: self.line_indent(stmt.start_byte()),
            leading: if inline { String::new() } else { leading.to_string() },
            indent: if inline {
                String::new()
            } else {
                self.line_indent(first.start_byte())
            },
            text: self
                .slice(first.start_byte(), def_node.end_byte())
                .trim_end()
                .to_string(),
            injected: Vec::new(),
        };

        Ok(FunctionDef {
            name,
            is_async,
            decorators,
            type_params: def_node
                .child_by_field_name("type_parameters")
                .map(|n| self.text(n).to_string()),
            params: self.parameters(params_node),
            returns: def_node
                .child_by_field_name("return_type")
                .map(|n| self.annotation(n)),
            body,
        })
    }

    fn parameters(&self, node: Node<'_>) -> Vec<Param> {
        let mut params = Vec::new();
        let mut keyword_only = false;
        let mut cursor = node.walk();

        for child in node.named_children(&mut cursor) {
            let text = self.text(child).to_string();
            match child.kind() {
                "comment" => {}
                "positional_separator" => params.push(Param::PositionalOnlyMarker),
                "keyword_separator" | "list_splat_pattern" => {
                    keyword_only = true;
                    params.push(Param::Verbatim(text));
                }
                "dictionary_splat_pattern" => params.push(Param::Verbatim(text)),
                _ if keyword_only => params.push(Param::Verbatim(text)),
                "identifier" => params.push(Param::positional(&text)),
                "typed_parameter" => {
                    let mut inner = child.walk();
                    let target = child.named_children(&mut inner).next();
                    match target {
                        Some(target) if target.kind() == "identifier" => {
                            params.push(Param::Positional {
                                name: self.text(target).to_string(),
                                annotation: child
                                    .child_by_field_name("type")
                                    .map(|t| self.annotation(t)),
                                default: None,
                            });
                        }
                        Some(target) => {
                            // `*args: T` starts the keyword-only section
                            if target.kind() == "list_splat_pattern" {
                                keyword_only = true;
                            }
                            params.push(Param::Verbatim(text));
                        }
                        None => params.push(Param::Verbatim(text)),
                    }
                }
                "default_parameter" | "typed_default_parameter" => {
                    let name = child.child_by_field_name("name");
                    let value = child.child_by_field_name("value");
                    match (name, value) {
                        (Some(name), Some(value)) if name.kind() == "identifier" => {
                            params.push(Param::Positional {
                                name: self.text(name).to_string(),
                                annotation: child
                                    .child_by_field_name("type")
                                    .map(|t| self.annotation(t)),
                                default: Some(self.text(value).to_string()),
                            });
                        }
                        _ => params.push(Param::Verbatim(text)),
                    }
                }
                _ => params.push(Param::Verbatim(text)),
            }
        }

        params
    }

    fn annotation(&self, node: Node<'_>) -> Annotation {
        if node.kind() == "identifier" {
            return Annotation::Name(self.text(node).to_string());
        }
        let mut cursor = node.walk();
        let inner: Vec<Node<'_>> = node
            .named_children(&mut cursor)
            .filter(|n| n.kind() != "comment")
            .collect();
        match inner.as_slice() {
            [only] if only.kind() == "identifier" => Annotation::Name(self.text(*only).to_string()),
            _ => Annotation::Expr(self.text(node).to_string()),
        }
    }

    fn for_loop(&self, node: Node<'_>) -> ForLoop {
        let Some(right) = node.child_by_field_name("right") else {
            return ForLoop {
                head: self.text(node).to_string(),
                iter: Iterable::Other(String::new()),
                tail: String::new(),
            };
        };
        let right = unparenthesized(right);

        let iter = match (
            right.kind(),
            right.child_by_field_name("function"),
            right.child_by_field_name("arguments"),
        ) {
            ("call", Some(function), Some(_)) if function.kind() == "identifier" => {
                Iterable::Call {
                    callee: self.text(function).to_string(),
                    arguments: self.slice(function.end_byte(), right.end_byte()).to_string(),
                }
            }
            _ => Iterable::Other(self.text(right).to_string()),
        };

        ForLoop {
            head: self.slice(node.start_byte(), right.start_byte()).to_string(),
            iter,
            tail: self
                .slice(right.end_byte(), node.end_byte())
                .trim_end()
                .to_string(),
        }
    }

    /// Split a statement into verbatim text and the statements of its blocks.
    fn compound(&self, node: Node<'_>) -> Result<Stmt, OptimizeError> {
        let mut fragments = Vec::new();
        let mut pos = node.start_byte();
        self.splice(node, &mut pos, &mut fragments)?;
        push_text(&mut fragments, self.slice(pos, node.end_byte()).trim_end());

        match fragments.as_slice() {
            [] => Ok(Stmt::Other(String::new())),
            [Fragment::Text(text)] => Ok(Stmt::Other(text.clone())),
            _ => Ok(Stmt::Compound(Compound { fragments })),
        }
    }

    fn splice(
        &self,
        node: Node<'_>,
        pos: &mut usize,
        fragments: &mut Vec<Fragment>,
    ) -> Result<(), OptimizeError> {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "block" {
                let mut block_cursor = child.walk();
                for stmt in child.named_children(&mut block_cursor) {
                    if stmt.kind() == "comment" {
                        continue;
                    }
                    push_text(fragments, self.slice(*pos, stmt.start_byte()));
                    fragments.push(Fragment::Stmt(self.statement(stmt)?));
                    *pos = stmt.end_byte();
                }
            } else if child.child_count() > 0 {
                self.splice(child, pos, fragments)?;
            }
        }
        Ok(())
    }
}

/// `((range(n)))` -> `range(n)`. The parentheses stay in the surrounding text.
fn unparenthesized(node: Node<'_>) -> Node<'_> {
    let mut current = node;
    while current.kind() == "parenthesized_expression" {
        let mut cursor = current.walk();
        let inner: Vec<Node<'_>> = current
            .named_children(&mut cursor)
            .filter(|n| n.kind() != "comment")
            .collect();
        match inner.as_slice() {
            [only] => current = *only,
            _ => break,
        }
    }
    current
}

fn push_text(fragments: &mut Vec<Fragment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Fragment::Text(last)) = fragments.last_mut() {
        last.push_str(text);
    } else {
        fragments.push(Fragment::Text(text.to_string()));
    }
}
