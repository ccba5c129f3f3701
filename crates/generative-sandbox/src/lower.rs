//! Lowering from the tree-sitter CST to the owned [`crate::ast`]
//!
//! Lowering is also where the capability policy is enforced statically:
//! denied names, dunder access, imports outside the module allow-list and
//! calls to builtins outside the builtin allow-list all fail here as
//! [`CompileError`]s, before any code runs.

use crate::ast::{
    Arg, BinOp, BoolOp, Clause, CmpOp, Expr, FunctionDef, Param, ParamKind, Stmt, StmtKind,
    Target, UnaryOp,
};
use crate::error::CompileError;
use crate::language::{all_children, first_error, line_of, named_children, text_of, Language};
use crate::policy::{is_denied, CapabilityPolicy};
use generative_artifact::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tree_sitter::Node;

/// Names the host language treats as builtins; calling one that the policy
/// does not allow is a compile error unless the unit binds the name itself
const KNOWN_BUILTINS: &[&str] = &[
    "abs", "all", "any", "ascii", "bin", "bool", "bytearray", "bytes", "callable", "chr",
    "classmethod", "complex", "dict", "dir", "divmod", "enumerate", "filter", "float", "format",
    "frozenset", "hash", "help", "hex", "id", "int", "isinstance", "issubclass", "iter", "len",
    "list", "map", "max", "memoryview", "min", "next", "object", "oct", "ord", "pow", "property",
    "range", "repr", "reversed", "round", "set", "slice", "sorted", "staticmethod", "str", "sum",
    "super", "tuple", "type", "zip",
];

/// Lowered source file: function definitions plus module-level imports
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    /// Top-level `def`s in source order
    pub functions: Vec<Arc<FunctionDef>>,
    /// `(bound name, dotted target)`; the target is `module` or `module.name`
    pub imports: Vec<(String, String)>,
}

impl Module {
    /// Function defined under `name`
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Parse and lower `source` under `policy`
///
/// # Errors
/// Returns error on parse failure, unsupported constructs or policy violations
pub fn lower_module(source: &str, policy: &CapabilityPolicy) -> Result<Module, CompileError> {
    let tree = Language::Python.parse(source)?;
    let root = tree.root_node();
    if let Some(bad) = first_error(root) {
        return Err(CompileError::parse(
            line_of(&bad),
            format!("unexpected '{}'", text_of(&bad, source).trim()),
        ));
    }

    let lowerer = Lowerer { source, policy };
    let mut module = Module::default();
    for node in named_children(&root) {
        match node.kind() {
            "function_definition" => module.functions.push(Arc::new(lowerer.function(node)?)),
            "import_statement" | "import_from_statement" => {
                match lowerer.statement(node)?.kind {
                    StmtKind::Import { module: m, alias } => module.imports.push((alias, m)),
                    StmtKind::ImportFrom { module: m, names } => module
                        .imports
                        .extend(names.into_iter().map(|(name, alias)| (alias, format!("{m}.{name}")))),
                    _ => {}
                }
            }
            "expression_statement" if is_docstring(&node) => {}
            "decorated_definition" => {
                return Err(CompileError::unsupported(line_of(&node), "decorated definition"))
            }
            other => {
                return Err(CompileError::unsupported(
                    line_of(&node),
                    format!("top-level {other}"),
                ))
            }
        }
    }

    let mut module_scope: HashSet<String> =
        module.functions.iter().map(|f| f.name.clone()).collect();
    module_scope.extend(module.imports.iter().map(|(alias, _)| alias.clone()));
    for function in &module.functions {
        check_builtin_calls(function, &[&module_scope], policy)?;
    }
    Ok(module)
}

fn is_docstring(node: &Node<'_>) -> bool {
    let children = named_children(node);
    children.len() == 1 && matches!(children[0].kind(), "string" | "concatenated_string")
}

struct Lowerer<'s> {
    source: &'s str,
    policy: &'s CapabilityPolicy,
}

impl<'s> Lowerer<'s> {
    fn text(&self, node: &Node<'_>) -> &'s str {
        text_of(node, self.source)
    }

    fn field<'t>(&self, node: &Node<'t>, name: &str) -> Result<Node<'t>, CompileError> {
        node.child_by_field_name(name).ok_or_else(|| {
            CompileError::parse(line_of(node), format!("{} without {name}", node.kind()))
        })
    }

    fn function(&self, node: Node<'_>) -> Result<FunctionDef, CompileError> {
        let line = line_of(&node);
        if all_children(&node).first().is_some_and(|c| c.kind() == "async") {
            return Err(CompileError::unsupported(line, "async function"));
        }
        let name = self.identifier(&self.field(&node, "name")?)?;
        let params = self.parameters(&self.field(&node, "parameters")?)?;
        let body = self.block(&self.field(&node, "body")?)?;
        Ok(FunctionDef {
            name,
            params,
            body,
            line,
        })
    }

    fn identifier(&self, node: &Node<'_>) -> Result<String, CompileError> {
        let name = self.text(node);
        if name.starts_with("__") {
            return Err(CompileError::forbidden(
                line_of(node),
                format!("dunder name '{name}'"),
            ));
        }
        Ok(name.to_string())
    }

    fn parameters(&self, node: &Node<'_>) -> Result<Vec<Param>, CompileError> {
        let mut params = Vec::new();
        let mut keyword_only = false;
        let plain = |keyword_only: bool| {
            if keyword_only {
                ParamKind::KeywordOnly
            } else {
                ParamKind::Positional
            }
        };

        for child in named_children(node) {
            let param = match child.kind() {
                "identifier" => Param {
                    name: self.identifier(&child)?,
                    kind: plain(keyword_only),
                    default: None,
                },
                "default_parameter" | "typed_default_parameter" => Param {
                    name: self.identifier(&self.field(&child, "name")?)?,
                    kind: plain(keyword_only),
                    default: Some(self.expr(&self.field(&child, "value")?)?),
                },
                "typed_parameter" => {
                    let inner = named_children(&child)
                        .into_iter()
                        .next()
                        .ok_or_else(|| CompileError::parse(line_of(&child), "empty parameter"))?;
                    match self.splat_param(&inner, &mut keyword_only)? {
                        Some(param) => param,
                        None => Param {
                            name: self.identifier(&inner)?,
                            kind: plain(keyword_only),
                            default: None,
                        },
                    }
                }
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    match self.splat_param(&child, &mut keyword_only)? {
                        Some(param) => param,
                        None => continue,
                    }
                }
                "keyword_separator" => {
                    keyword_only = true;
                    continue;
                }
                "positional_separator" => continue,
                other => {
                    return Err(CompileError::unsupported(
                        line_of(&child),
                        format!("parameter form {other}"),
                    ))
                }
            };
            params.push(param);
        }
        Ok(params)
    }

    fn splat_param(
        &self,
        node: &Node<'_>,
        keyword_only: &mut bool,
    ) -> Result<Option<Param>, CompileError> {
        let kind = match node.kind() {
            "list_splat_pattern" => ParamKind::VarArgs,
            "dictionary_splat_pattern" => ParamKind::VarKwargs,
            _ => return Ok(None),
        };
        let inner = named_children(node)
            .into_iter()
            .next()
            .ok_or_else(|| CompileError::parse(line_of(node), "splat without name"))?;
        if kind == ParamKind::VarArgs {
            *keyword_only = true;
        }
        Ok(Some(Param {
            name: self.identifier(&inner)?,
            kind,
            default: None,
        }))
    }

    fn block(&self, node: &Node<'_>) -> Result<Vec<Stmt>, CompileError> {
        named_children(node)
            .into_iter()
            .map(|child| self.statement(child))
            .collect()
    }

    fn statement(&self, node: Node<'_>) -> Result<Stmt, CompileError> {
        let line = line_of(&node);
        let kind = match node.kind() {
            "expression_statement" => self.expression_statement(&node)?,
            "return_statement" => StmtKind::Return(
                named_children(&node)
                    .first()
                    .map(|value| self.expr(value))
                    .transpose()?,
            ),
            "pass_statement" => StmtKind::Pass,
            "break_statement" => StmtKind::Break,
            "continue_statement" => StmtKind::Continue,
            "if_statement" => self.if_statement(&node)?,
            "for_statement" => {
                if all_children(&node).first().is_some_and(|c| c.kind() == "async") {
                    return Err(CompileError::unsupported(line, "async for"));
                }
                StmtKind::For {
                    target: self.target(&self.field(&node, "left")?)?,
                    iter: self.expr(&self.field(&node, "right")?)?,
                    body: self.block(&self.field(&node, "body")?)?,
                    orelse: self.else_clause(&node)?,
                }
            }
            "while_statement" => StmtKind::While {
                test: self.expr(&self.field(&node, "condition")?)?,
                body: self.block(&self.field(&node, "body")?)?,
                orelse: self.else_clause(&node)?,
            },
            "raise_statement" => self.raise_statement(&node)?,
            "assert_statement" => {
                let parts = named_children(&node);
                let test = parts
                    .first()
                    .ok_or_else(|| CompileError::parse(line, "assert without test"))?;
                StmtKind::Assert {
                    test: self.expr(test)?,
                    message: parts.get(1).map(|m| self.expr(m)).transpose()?,
                }
            }
            "function_definition" => StmtKind::FunctionDef(Arc::new(self.function(node)?)),
            "import_statement" => self.import_statement(&node)?,
            "import_from_statement" => self.import_from_statement(&node)?,
            "global_statement" | "nonlocal_statement" => {
                return Err(CompileError::forbidden(line, "global/nonlocal declaration"))
            }
            "print_statement" | "exec_statement" => {
                return Err(CompileError::forbidden(line, self.text(&node).trim().to_string()))
            }
            "decorated_definition" => {
                return Err(CompileError::unsupported(line, "decorated definition"))
            }
            "ERROR" => return Err(CompileError::parse(line, self.text(&node).trim().to_string())),
            other => return Err(CompileError::unsupported(line, other.replace('_', " "))),
        };
        Ok(Stmt { line, kind })
    }

    fn expression_statement(&self, node: &Node<'_>) -> Result<StmtKind, CompileError> {
        let children = named_children(node);
        match children.as_slice() {
            [single] => match single.kind() {
                "assignment" => self.assignment(single),
                "augmented_assignment" => {
                    let token = self.text(&self.field(single, "operator")?);
                    let op = BinOp::from_token(token).ok_or_else(|| {
                        CompileError::unsupported(line_of(single), format!("operator {token}"))
                    })?;
                    Ok(StmtKind::AugAssign {
                        target: self.target(&self.field(single, "left")?)?,
                        op,
                        value: self.expr(&self.field(single, "right")?)?,
                    })
                }
                _ => Ok(StmtKind::Expr(self.expr(single)?)),
            },
            many => Ok(StmtKind::Expr(Expr::Tuple(
                many.iter().map(|n| self.expr(n)).collect::<Result<_, _>>()?,
            ))),
        }
    }

    fn assignment(&self, node: &Node<'_>) -> Result<StmtKind, CompileError> {
        let mut targets = vec![self.target(&self.field(node, "left")?)?];
        let mut right = node.child_by_field_name("right").ok_or_else(|| {
            CompileError::unsupported(line_of(node), "annotation without value")
        })?;
        while right.kind() == "assignment" {
            targets.push(self.target(&self.field(&right, "left")?)?);
            right = self.field(&right, "right")?;
        }
        Ok(StmtKind::Assign {
            targets,
            value: self.expr(&right)?,
        })
    }

    fn if_statement(&self, node: &Node<'_>) -> Result<StmtKind, CompileError> {
        let mut branches = vec![(
            self.expr(&self.field(node, "condition")?)?,
            self.block(&self.field(node, "consequence")?)?,
        )];
        let mut orelse = Vec::new();

        let mut cursor = node.walk();
        let alternatives: Vec<Node<'_>> = node
            .children_by_field_name("alternative", &mut cursor)
            .collect();
        for alt in alternatives {
            match alt.kind() {
                "elif_clause" => branches.push((
                    self.expr(&self.field(&alt, "condition")?)?,
                    self.block(&self.field(&alt, "consequence")?)?,
                )),
                "else_clause" => orelse = self.block(&self.field(&alt, "body")?)?,
                other => return Err(CompileError::unsupported(line_of(&alt), other.to_string())),
            }
        }
        Ok(StmtKind::If { branches, orelse })
    }

    fn else_clause(&self, node: &Node<'_>) -> Result<Vec<Stmt>, CompileError> {
        match node.child_by_field_name("alternative") {
            Some(clause) => self.block(&self.field(&clause, "body")?),
            None => Ok(Vec::new()),
        }
    }

    fn raise_statement(&self, node: &Node<'_>) -> Result<StmtKind, CompileError> {
        let cause = node.child_by_field_name("cause").map(|c| c.id());
        let Some(raised) = named_children(node)
            .into_iter()
            .find(|child| Some(child.id()) != cause)
        else {
            return Ok(StmtKind::Raise {
                class: None,
                message: None,
            });
        };

        let constructor = raised
            .child_by_field_name("function")
            .filter(|f| raised.kind() == "call" && f.kind() == "identifier");
        match (raised.kind(), constructor) {
            ("identifier", _) => Ok(StmtKind::Raise {
                class: Some(self.identifier(&raised)?),
                message: None,
            }),
            (_, Some(function)) => {
                let class = self.identifier(&function)?;
                let args = self.field(&raised, "arguments")?;
                let message = named_children(&args)
                    .first()
                    .map(|first| self.expr(first))
                    .transpose()?;
                Ok(StmtKind::Raise {
                    class: Some(class),
                    message,
                })
            }
            _ => Ok(StmtKind::Raise {
                class: Some("Exception".to_string()),
                message: Some(self.expr(&raised)?),
            }),
        }
    }

    fn check_module(&self, node: &Node<'_>, module: &str) -> Result<(), CompileError> {
        if self.policy.module_allowed(module) {
            Ok(())
        } else {
            Err(CompileError::forbidden(
                line_of(node),
                format!("import of '{module}' is not allowed"),
            ))
        }
    }

    fn import_statement(&self, node: &Node<'_>) -> Result<StmtKind, CompileError> {
        let mut cursor = node.walk();
        let names: Vec<Node<'_>> = node.children_by_field_name("name", &mut cursor).collect();
        let [single] = names.as_slice() else {
            return Err(CompileError::unsupported(
                line_of(node),
                "importing several modules in one statement",
            ));
        };
        let (module, alias) = match single.kind() {
            "aliased_import" => (
                self.text(&self.field(single, "name")?).to_string(),
                self.identifier(&self.field(single, "alias")?)?,
            ),
            _ => {
                let module = self.text(single).to_string();
                let alias = module.split('.').next().unwrap_or_default().to_string();
                (module, alias)
            }
        };
        self.check_module(node, &module)?;
        Ok(StmtKind::Import { module, alias })
    }

    fn import_from_statement(&self, node: &Node<'_>) -> Result<StmtKind, CompileError> {
        let module_node = self.field(node, "module_name")?;
        if module_node.kind() == "relative_import" {
            return Err(CompileError::forbidden(line_of(node), "relative import"));
        }
        let module = self.text(&module_node).to_string();
        self.check_module(node, &module)?;

        if named_children(node)
            .iter()
            .any(|c| c.kind() == "wildcard_import")
        {
            return Err(CompileError::unsupported(line_of(node), "wildcard import"));
        }

        let mut cursor = node.walk();
        let imported: Vec<Node<'_>> = node.children_by_field_name("name", &mut cursor).collect();
        let mut names = Vec::with_capacity(imported.len());
        for item in imported {
            let pair = match item.kind() {
                "aliased_import" => (
                    self.text(&self.field(&item, "name")?).to_string(),
                    self.identifier(&self.field(&item, "alias")?)?,
                ),
                _ => {
                    let name = self.identifier(&item)?;
                    (name.clone(), name)
                }
            };
            names.push(pair);
        }
        Ok(StmtKind::ImportFrom { module, names })
    }

    fn target(&self, node: &Node<'_>) -> Result<Target, CompileError> {
        match node.kind() {
            "identifier" | "keyword_identifier" => Ok(Target::name(self.identifier(node)?)),
            "subscript" => {
                let Target::Place { root, mut path } = self.target(&self.field(node, "value")?)?
                else {
                    return Err(CompileError::unsupported(
                        line_of(node),
                        "subscript of an unpacking target",
                    ));
                };
                path.push(self.subscript_index(node)?);
                Ok(Target::Place { root, path })
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
            | "expression_list" => Ok(Target::Unpack(
                named_children(node)
                    .iter()
                    .map(|child| self.target(child))
                    .collect::<Result<_, _>>()?,
            )),
            "parenthesized_expression" => {
                let inner = named_children(node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| CompileError::parse(line_of(node), "empty parentheses"))?;
                self.target(&inner)
            }
            "attribute" => Err(CompileError::unsupported(
                line_of(node),
                "attribute assignment",
            )),
            other => Err(CompileError::unsupported(
                line_of(node),
                format!("assignment to {other}"),
            )),
        }
    }

    fn subscript_index(&self, node: &Node<'_>) -> Result<Expr, CompileError> {
        let mut cursor = node.walk();
        let parts: Vec<Node<'_>> = node
            .children_by_field_name("subscript", &mut cursor)
            .collect();
        match parts.as_slice() {
            [single] if single.kind() != "slice" => self.expr(single),
            [] => Err(CompileError::parse(line_of(node), "empty subscript")),
            many if many.iter().all(|p| p.kind() != "slice") => Ok(Expr::Tuple(
                many.iter().map(|p| self.expr(p)).collect::<Result<_, _>>()?,
            )),
            _ => Err(CompileError::unsupported(line_of(node), "slice assignment")),
        }
    }

    fn exprs(&self, nodes: &[Node<'_>]) -> Result<Vec<Expr>, CompileError> {
        nodes.iter().map(|n| self.expr(n)).collect()
    }

    fn boxed(&self, node: &Node<'_>) -> Result<Box<Expr>, CompileError> {
        self.expr(node).map(Box::new)
    }

    #[allow(clippy::too_many_lines)]
    fn expr(&self, node: &Node<'_>) -> Result<Expr, CompileError> {
        let line = line_of(node);
        let expr = match node.kind() {
            "integer" => Expr::Const(Value::Int(parse_int(self.text(node), line)?)),
            "float" => Expr::Const(Value::Float(parse_float(self.text(node), line)?)),
            "true" => Expr::Const(Value::Bool(true)),
            "false" => Expr::Const(Value::Bool(false)),
            "none" => Expr::Const(Value::None),
            "ellipsis" => Expr::Const(Value::None),
            "string" => Expr::Const(Value::Str(self.string(node)?)),
            "concatenated_string" => {
                let mut out = String::new();
                for part in named_children(node) {
                    out.push_str(&self.string(&part)?);
                }
                Expr::Const(Value::Str(out))
            }
            "identifier" | "keyword_identifier" => Expr::Name(self.identifier(node)?),
            "binary_operator" => {
                let token = self.text(&self.field(node, "operator")?);
                let op = BinOp::from_token(token)
                    .filter(|_| !token.ends_with('='))
                    .ok_or_else(|| CompileError::unsupported(line, format!("operator {token}")))?;
                Expr::Binary {
                    op,
                    left: self.boxed(&self.field(node, "left")?)?,
                    right: self.boxed(&self.field(node, "right")?)?,
                }
            }
            "unary_operator" => {
                let op = match self.text(&self.field(node, "operator")?) {
                    "-" => UnaryOp::Neg,
                    "+" => UnaryOp::Pos,
                    "~" => UnaryOp::Invert,
                    other => {
                        return Err(CompileError::unsupported(line, format!("unary {other}")))
                    }
                };
                Expr::Unary {
                    op,
                    operand: self.boxed(&self.field(node, "argument")?)?,
                }
            }
            "not_operator" => Expr::Unary {
                op: UnaryOp::Not,
                operand: self.boxed(&self.field(node, "argument")?)?,
            },
            "boolean_operator" => {
                let op = match self.text(&self.field(node, "operator")?) {
                    "and" => BoolOp::And,
                    _ => BoolOp::Or,
                };
                Expr::Bool {
                    op,
                    left: self.boxed(&self.field(node, "left")?)?,
                    right: self.boxed(&self.field(node, "right")?)?,
                }
            }
            "comparison_operator" => self.comparison(node)?,
            "conditional_expression" => {
                let parts = named_children(node);
                let [body, test, orelse] = parts.as_slice() else {
                    return Err(CompileError::parse(line, "malformed conditional expression"));
                };
                Expr::IfExp {
                    test: self.boxed(test)?,
                    body: self.boxed(body)?,
                    orelse: self.boxed(orelse)?,
                }
            }
            "parenthesized_expression" => {
                let inner = named_children(node)
                    .into_iter()
                    .next()
                    .ok_or_else(|| CompileError::parse(line, "empty parentheses"))?;
                self.expr(&inner)?
            }
            "tuple" | "expression_list" => Expr::Tuple(self.elements(node)?),
            "list" => Expr::List(self.elements(node)?),
            "dictionary" => {
                let mut pairs = Vec::new();
                for pair in named_children(node) {
                    if pair.kind() != "pair" {
                        return Err(CompileError::unsupported(
                            line_of(&pair),
                            "dictionary unpacking",
                        ));
                    }
                    pairs.push((
                        self.expr(&self.field(&pair, "key")?)?,
                        self.expr(&self.field(&pair, "value")?)?,
                    ));
                }
                Expr::Dict(pairs)
            }
            "list_comprehension" | "generator_expression" => Expr::ListComp {
                element: self.boxed(&self.field(node, "body")?)?,
                clauses: self.clauses(node)?,
            },
            "dictionary_comprehension" => {
                let pair = self.field(node, "body")?;
                Expr::DictComp {
                    key: self.boxed(&self.field(&pair, "key")?)?,
                    value: self.boxed(&self.field(&pair, "value")?)?,
                    clauses: self.clauses(node)?,
                }
            }
            "subscript" => {
                let value = self.boxed(&self.field(node, "value")?)?;
                let mut cursor = node.walk();
                let parts: Vec<Node<'_>> = node
                    .children_by_field_name("subscript", &mut cursor)
                    .collect();
                match parts.as_slice() {
                    [slice] if slice.kind() == "slice" => {
                        let [lower, upper, step] = self.slice_parts(slice)?;
                        Expr::Slice {
                            value,
                            lower,
                            upper,
                            step,
                        }
                    }
                    _ => Expr::Subscript {
                        value,
                        index: Box::new(self.subscript_index(node)?),
                    },
                }
            }
            "attribute" => Expr::Attribute {
                value: self.boxed(&self.field(node, "object")?)?,
                name: self.identifier(&self.field(node, "attribute")?)?,
            },
            "call" => self.call(node)?,
            "lambda" => {
                let params = match node.child_by_field_name("parameters") {
                    Some(params) => self.parameters(&params)?,
                    None => Vec::new(),
                };
                let body = self.expr(&self.field(node, "body")?)?;
                Expr::Lambda(Arc::new(FunctionDef {
                    name: "<lambda>".to_string(),
                    params,
                    body: vec![Stmt {
                        line,
                        kind: StmtKind::Return(Some(body)),
                    }],
                    line,
                }))
            }
            "ERROR" => return Err(CompileError::parse(line, self.text(node).trim().to_string())),
            other => return Err(CompileError::unsupported(line, other.replace('_', " "))),
        };
        Ok(expr)
    }

    fn elements(&self, node: &Node<'_>) -> Result<Vec<Expr>, CompileError> {
        let children = named_children(node);
        if let Some(splat) = children.iter().find(|c| c.kind() == "list_splat") {
            return Err(CompileError::unsupported(line_of(splat), "iterable unpacking"));
        }
        self.exprs(&children)
    }

    fn comparison(&self, node: &Node<'_>) -> Result<Expr, CompileError> {
        let mut operands = Vec::new();
        let mut operators = Vec::new();
        for child in all_children(node) {
            if child.is_named() {
                operands.push(self.expr(&child)?);
            } else {
                let token = self.text(&child);
                let op = CmpOp::from_token(token).ok_or_else(|| {
                    CompileError::unsupported(line_of(&child), format!("comparison {token}"))
                })?;
                operators.push(op);
            }
        }
        if operands.len() != operators.len() + 1 {
            return Err(CompileError::parse(line_of(node), "malformed comparison"));
        }
        let mut operands = operands.into_iter();
        let first = operands
            .next()
            .ok_or_else(|| CompileError::parse(line_of(node), "empty comparison"))?;
        Ok(Expr::Compare {
            first: Box::new(first),
            rest: operators.into_iter().zip(operands).collect(),
        })
    }

    fn slice_parts(&self, node: &Node<'_>) -> Result<[Option<Box<Expr>>; 3], CompileError> {
        let mut parts: [Option<Box<Expr>>; 3] = [None, None, None];
        let mut position = 0usize;
        for child in all_children(node) {
            if child.kind() == ":" {
                position += 1;
            } else if child.is_named() {
                let slot = parts
                    .get_mut(position)
                    .ok_or_else(|| CompileError::parse(line_of(node), "malformed slice"))?;
                *slot = Some(self.boxed(&child)?);
            }
        }
        Ok(parts)
    }

    fn clauses(&self, node: &Node<'_>) -> Result<Vec<Clause>, CompileError> {
        let body = node.child_by_field_name("body").map(|b| b.id());
        let mut clauses = Vec::new();
        for child in named_children(node) {
            if Some(child.id()) == body {
                continue;
            }
            match child.kind() {
                "for_in_clause" => {
                    if all_children(&child).first().is_some_and(|c| c.kind() == "async") {
                        return Err(CompileError::unsupported(line_of(&child), "async for"));
                    }
                    let mut cursor = child.walk();
                    let rights: Vec<Node<'_>> =
                        child.children_by_field_name("right", &mut cursor).collect();
                    let iter = match rights.as_slice() {
                        [single] => self.expr(single)?,
                        many => Expr::Tuple(self.exprs(many)?),
                    };
                    clauses.push(Clause::For {
                        target: self.target(&self.field(&child, "left")?)?,
                        iter,
                    });
                }
                "if_clause" => {
                    let test = named_children(&child)
                        .into_iter()
                        .next()
                        .ok_or_else(|| CompileError::parse(line_of(&child), "empty if clause"))?;
                    clauses.push(Clause::If(self.expr(&test)?));
                }
                other => {
                    return Err(CompileError::unsupported(line_of(&child), other.to_string()))
                }
            }
        }
        Ok(clauses)
    }

    fn call(&self, node: &Node<'_>) -> Result<Expr, CompileError> {
        let function = self.field(node, "function")?;
        let arguments = self.field(node, "arguments")?;

        let args = if arguments.kind() == "generator_expression" {
            vec![Arg::Positional(self.expr(&arguments)?)]
        } else {
            let mut args = Vec::new();
            for child in named_children(&arguments) {
                let arg = match child.kind() {
                    "keyword_argument" => Arg::Keyword(
                        self.text(&self.field(&child, "name")?).to_string(),
                        self.expr(&self.field(&child, "value")?)?,
                    ),
                    "list_splat" => Arg::Splat(self.splat_operand(&child)?),
                    "dictionary_splat" => Arg::KwSplat(self.splat_operand(&child)?),
                    _ => Arg::Positional(self.expr(&child)?),
                };
                args.push(arg);
            }
            args
        };

        if function.kind() == "attribute" {
            return Ok(Expr::Method {
                receiver: self.boxed(&self.field(&function, "object")?)?,
                name: self.identifier(&self.field(&function, "attribute")?)?,
                args,
            });
        }
        Ok(Expr::Call {
            func: self.boxed(&function)?,
            args,
        })
    }

    fn splat_operand(&self, node: &Node<'_>) -> Result<Expr, CompileError> {
        let inner = named_children(node)
            .into_iter()
            .next()
            .ok_or_else(|| CompileError::parse(line_of(node), "empty unpacking"))?;
        self.expr(&inner)
    }

    fn string(&self, node: &Node<'_>) -> Result<String, CompileError> {
        let line = line_of(node);
        if named_children(node)
            .iter()
            .any(|c| c.kind() == "interpolation")
        {
            return Err(CompileError::forbidden(line, "f-string interpolation"));
        }
        parse_string_literal(self.text(node), line)
    }
}

fn parse_int(text: &str, line: usize) -> Result<i64, CompileError> {
    let digits = text.replace('_', "").to_ascii_lowercase();
    let parsed = if let Some(hex) = digits.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(oct) = digits.strip_prefix("0o") {
        i64::from_str_radix(oct, 8)
    } else if let Some(bin) = digits.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        digits.parse()
    };
    parsed.map_err(|_| CompileError::unsupported(line, format!("integer literal {text}")))
}

fn parse_float(text: &str, line: usize) -> Result<f64, CompileError> {
    let digits = text.replace('_', "");
    if digits.ends_with(['j', 'J']) {
        return Err(CompileError::unsupported(line, "complex literal"));
    }
    digits
        .parse()
        .map_err(|_| CompileError::parse(line, format!("float literal {text}")))
}

/// Decode a string literal including its prefix and quotes
///
/// # Errors
/// Returns error for byte strings and malformed literals
pub fn parse_string_literal(text: &str, line: usize) -> Result<String, CompileError> {
    let quote_at = text
        .find(['\'', '"'])
        .ok_or_else(|| CompileError::parse(line, "string without quotes"))?;
    let prefix = text[..quote_at].to_ascii_lowercase();
    if prefix.contains('b') {
        return Err(CompileError::unsupported(line, "byte string"));
    }
    let raw = prefix.contains('r');
    let formatted = prefix.contains('f');

    let quoted = &text[quote_at..];
    let delimiter = if quoted.starts_with("\"\"\"") || quoted.starts_with("'''") {
        &quoted[..3]
    } else {
        &quoted[..1]
    };
    let inner = quoted
        .strip_prefix(delimiter)
        .and_then(|s| s.strip_suffix(delimiter))
        .ok_or_else(|| CompileError::parse(line, "unterminated string"))?;

    let mut out = if raw {
        inner.to_string()
    } else {
        unescape(inner)
    };
    if formatted {
        out = out.replace("{{", "{").replace("}}", "}");
    }
    Ok(out)
}

fn unescape(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(kind @ ('x' | 'u' | 'U')) => {
                let width = match kind {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let code: String = (0..width).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push(kind);
                        out.push_str(&code);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Reject calls to host builtins the policy does not allow
///
/// A call is only checked when its target name is not bound by the function
/// itself or any enclosing scope, so units may shadow builtin names freely.
fn check_builtin_calls(
    function: &FunctionDef,
    outer: &[&HashSet<String>],
    policy: &CapabilityPolicy,
) -> Result<(), CompileError> {
    let mut bound: HashSet<String> = function.params.iter().map(|p| p.name.clone()).collect();
    collect_bindings(&function.body, &mut bound);

    let mut scopes: Vec<&HashSet<String>> = outer.to_vec();
    scopes.push(&bound);

    let mut visitor = CallCheck {
        scopes: &scopes,
        policy,
        line: function.line,
    };
    visitor.block(&function.body)
}

fn collect_bindings(body: &[Stmt], bound: &mut HashSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for target in targets {
                    target_names(target, bound);
                }
            }
            StmtKind::AugAssign { target, .. } => target_names(target, bound),
            StmtKind::For {
                target,
                body,
                orelse,
                ..
            } => {
                target_names(target, bound);
                collect_bindings(body, bound);
                collect_bindings(orelse, bound);
            }
            StmtKind::While { body, orelse, .. } => {
                collect_bindings(body, bound);
                collect_bindings(orelse, bound);
            }
            StmtKind::If { branches, orelse } => {
                for (_, block) in branches {
                    collect_bindings(block, bound);
                }
                collect_bindings(orelse, bound);
            }
            StmtKind::FunctionDef(def) => {
                bound.insert(def.name.clone());
            }
            StmtKind::Import { alias, .. } => {
                bound.insert(alias.clone());
            }
            StmtKind::ImportFrom { names, .. } => {
                bound.extend(names.iter().map(|(_, alias)| alias.clone()));
            }
            _ => {}
        }
    }
}

fn target_names(target: &Target, bound: &mut HashSet<String>) {
    match target {
        Target::Place { root, .. } => {
            bound.insert(root.clone());
        }
        Target::Unpack(items) => items.iter().for_each(|t| target_names(t, bound)),
    }
}

struct CallCheck<'a> {
    scopes: &'a [&'a HashSet<String>],
    policy: &'a CapabilityPolicy,
    line: usize,
}

impl CallCheck<'_> {
    fn block(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        body.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::Expr(e) | StmtKind::Return(Some(e)) => self.expr(e),
            StmtKind::Assign { targets, value } => {
                targets.iter().try_for_each(|t| self.target(t))?;
                self.expr(value)
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.target(target)?;
                self.expr(value)
            }
            StmtKind::If { branches, orelse } => {
                for (test, block) in branches {
                    self.expr(test)?;
                    self.block(block)?;
                }
                self.block(orelse)
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.target(target)?;
                self.expr(iter)?;
                self.block(body)?;
                self.block(orelse)
            }
            StmtKind::While { test, body, orelse } => {
                self.expr(test)?;
                self.block(body)?;
                self.block(orelse)
            }
            StmtKind::Raise { message, .. } => message.iter().try_for_each(|m| self.expr(m)),
            StmtKind::Assert { test, message } => {
                self.expr(test)?;
                message.iter().try_for_each(|m| self.expr(m))
            }
            StmtKind::FunctionDef(def) => self.nested(def),
            StmtKind::Return(None)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Pass
            | StmtKind::Import { .. }
            | StmtKind::ImportFrom { .. } => Ok(()),
        }
    }

    fn nested(&mut self, def: &FunctionDef) -> Result<(), CompileError> {
        for param in &def.params {
            if let Some(default) = &param.default {
                self.expr(default)?;
            }
        }
        check_builtin_calls(def, self.scopes, self.policy)
    }

    fn target(&mut self, target: &Target) -> Result<(), CompileError> {
        match target {
            Target::Place { path, .. } => path.iter().try_for_each(|e| self.expr(e)),
            Target::Unpack(items) => items.iter().try_for_each(|t| self.target(t)),
        }
    }

    fn args(&mut self, args: &[Arg]) -> Result<(), CompileError> {
        args.iter().try_for_each(|arg| match arg {
            Arg::Positional(e) | Arg::Keyword(_, e) | Arg::Splat(e) | Arg::KwSplat(e) => {
                self.expr(e)
            }
        })
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn comprehension(&mut self, clauses: &[Clause], exprs: &[&Expr]) -> Result<(), CompileError> {
        for clause in clauses {
            match clause {
                Clause::For { iter, .. } => self.expr(iter)?,
                Clause::If(test) => self.expr(test)?,
            }
        }
        exprs.iter().try_for_each(|e| self.expr(e))
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Const(_) => Ok(()),
            Expr::Name(name) => {
                if is_denied(name) && !self.is_bound(name) {
                    return Err(CompileError::forbidden(
                        self.line,
                        format!("use of '{name}'"),
                    ));
                }
                Ok(())
            }
            Expr::Call { func, args } => {
                if let Expr::Name(name) = func.as_ref() {
                    if KNOWN_BUILTINS.contains(&name.as_str())
                        && !self.policy.builtin_allowed(name)
                        && !self.is_bound(name)
                    {
                        return Err(CompileError::forbidden(
                            self.line,
                            format!("builtin '{name}' is not allowed"),
                        ));
                    }
                }
                self.expr(func)?;
                self.args(args)
            }
            Expr::Method { receiver, args, .. } => {
                self.expr(receiver)?;
                self.args(args)
            }
            Expr::Binary { left, right, .. } | Expr::Bool { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Compare { first, rest } => {
                self.expr(first)?;
                rest.iter().try_for_each(|(_, e)| self.expr(e))
            }
            Expr::IfExp { test, body, orelse } => {
                self.expr(test)?;
                self.expr(body)?;
                self.expr(orelse)
            }
            Expr::Attribute { value, .. } => self.expr(value),
            Expr::Subscript { value, index } => {
                self.expr(value)?;
                self.expr(index)
            }
            Expr::Slice {
                value,
                lower,
                upper,
                step,
            } => {
                self.expr(value)?;
                [lower, upper, step]
                    .into_iter()
                    .flatten()
                    .try_for_each(|e| self.expr(e))
            }
            Expr::List(items) | Expr::Tuple(items) => items.iter().try_for_each(|e| self.expr(e)),
            Expr::Dict(pairs) => pairs.iter().try_for_each(|(k, v)| {
                self.expr(k)?;
                self.expr(v)
            }),
            Expr::ListComp { element, clauses } => {
                self.comprehension(clauses, &[element.as_ref()])
            }
            Expr::DictComp {
                key,
                value,
                clauses,
            } => self.comprehension(clauses, &[key.as_ref(), value.as_ref()]),
            Expr::Lambda(def) => self.nested(def),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;

    fn lower(source: &str) -> Result<Module, CompileError> {
        lower_module(source, &CapabilityPolicy::default())
    }

    fn entry(source: &str) -> Arc<FunctionDef> {
        let module = lower(source).unwrap();
        module.functions[0].clone()
    }

    #[test]
    fn lowers_simple_function() {
        let def = entry("def add(a, b=2):\n    return a + b\n");
        assert_eq!(def.name, "add");
        assert_eq!(def.params.len(), 2);
        assert!(def.params[1].default.is_some());
        assert_eq!(def.positional_arity(), 2);
        assert!(matches!(
            def.body[0].kind,
            StmtKind::Return(Some(Expr::Binary { op: BinOp::Add, .. }))
        ));
    }

    #[test]
    fn lowers_star_params() {
        let def = entry("def f(a, *rest, key=None, **extra):\n    return a\n");
        let kinds: Vec<_> = def.params.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParamKind::Positional,
                ParamKind::VarArgs,
                ParamKind::KeywordOnly,
                ParamKind::VarKwargs
            ]
        );
    }

    #[test]
    fn lowers_chained_comparison() {
        let def = entry("def f(x):\n    return 0 < x <= 10 and x not in [3, 4]\n");
        let StmtKind::Return(Some(Expr::Bool { left, right, .. })) = &def.body[0].kind else {
            panic!("expected boolean operator");
        };
        assert!(matches!(left.as_ref(), Expr::Compare { rest, .. } if rest.len() == 2));
        assert!(
            matches!(right.as_ref(), Expr::Compare { rest, .. } if rest[0].0 == CmpOp::NotIn)
        );
    }

    #[test]
    fn lowers_subscript_assignment_and_unpacking() {
        let def = entry("def f(xs):\n    a, b = 1, 2\n    xs[0] = a\n    return xs\n");
        assert!(matches!(
            &def.body[0].kind,
            StmtKind::Assign { targets, .. } if matches!(&targets[0], Target::Unpack(items) if items.len() == 2)
        ));
        assert!(matches!(
            &def.body[1].kind,
            StmtKind::Assign { targets, .. } if matches!(&targets[0], Target::Place { root, path } if root == "xs" && path.len() == 1)
        ));
    }

    #[test]
    fn comments_do_not_break_lowering() {
        let def = entry("def f(x):\n    # note\n    y = x  # trailing\n    return y\n");
        assert_eq!(def.body.len(), 2);
    }

    #[test]
    fn rejects_forbidden_import() {
        let err = lower("def f():\n    import os\n    return 1\n").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Forbidden);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn allows_math_import() {
        let def = entry("def f(x):\n    import math\n    return math.sqrt(x)\n");
        assert!(matches!(&def.body[0].kind, StmtKind::Import { module, .. } if module == "math"));
    }

    #[test]
    fn rejects_denied_names_and_dunders() {
        let err = lower("def f():\n    return eval('1')\n").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Forbidden);
        let err = lower("def f(x):\n    return x.__class__\n").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Forbidden);
    }

    #[test]
    fn rejects_disallowed_builtin_unless_shadowed() {
        let err = lower("def f(xs):\n    return map(str, xs)\n").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Forbidden);

        let ok = lower("def f(xs):\n    def map(g, items):\n        return [g(i) for i in items]\n    return map(str, xs)\n");
        assert!(ok.is_ok());
    }

    #[test]
    fn rejects_unsupported_statements() {
        let err = lower("def f():\n    try:\n        return 1\n    except Exception:\n        return 2\n")
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Unsupported);
        let err = lower("def f():\n    global x\n    return 1\n").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Forbidden);
    }

    #[test]
    fn rejects_fstring_interpolation() {
        let err = lower("def f(x):\n    return f'{x}'\n").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Forbidden);
        assert!(lower("def f():\n    return f'plain {{}}'\n").is_ok());
    }

    #[test]
    fn decodes_string_literals() {
        assert_eq!(parse_string_literal(r"'a\nb'", 1).unwrap(), "a\nb");
        assert_eq!(parse_string_literal(r#"r'a\nb'"#, 1).unwrap(), r"a\nb");
        assert_eq!(parse_string_literal("\"\"\"doc\"\"\"", 1).unwrap(), "doc");
        assert_eq!(parse_string_literal(r"'\x41é'", 1).unwrap(), "Aé");
        assert!(parse_string_literal("b'x'", 1).is_err());
    }

    #[test]
    fn parses_integer_forms() {
        assert_eq!(parse_int("1_000", 1).unwrap(), 1000);
        assert_eq!(parse_int("0xff", 1).unwrap(), 255);
        assert!(parse_int("99999999999999999999", 1).is_err());
    }

    #[test]
    fn syntax_error_is_parse_error() {
        let err = lower("def f(:\n    return 1\n").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Parse);
    }
}
