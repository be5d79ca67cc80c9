//! # Value Resolution
//!
//! Turns a [`Template`] plus a [`ValueMap`] into a [`Resolution`]: one concrete
//! value for every field, table cell and group sub-field.
//!
//! ```text
//! Template ─┐
//!           ├─► Resolver ─► index keys ─► evaluate formulas (memo + cycle guard) ─► Resolution
//! ValueMap ─┘
//! ```
//!
//! ## Keys
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `total` | top-level field |
//! | `items_0_qty` | table cell, 0-based row |
//! | `items.qty` | whole table column (formulas only) |
//! | `address.zip` | group sub-field |
//!
//! ## Reference lookup
//!
//! A name inside a formula is tried, in order, as a same-row column (table
//! column formulas) or sibling (group sub-field formulas), then as an indexed
//! key from the table above, then as a raw value key. Anything else is 0.
//!
//! A formula that re-enters a key already being evaluated fails with
//! [`ValueError::Circular`], and so does every formula that depends on it.
//! Resolution never panics and always terminates.
//!
//! Dependencies are settled with an explicit stack before a formula is
//! evaluated, so long acyclic chains cost no stack depth. Recursion that
//! still goes past a fixed depth (very long cycles) ends in `#ERROR!`.

mod value;

pub use value::{DEFAULT_DATE_FORMAT, ResolvedValue, ValueError, format_date, format_number, interpret};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

use crate::formula::{self, EvalError, Expr, FormulaError, Operand, Scope};
use crate::template::values::to_number;
use crate::template::{Field, FieldType, TableColumn, Template, ValueMap, cell_key, group_key};

/// Deepest chain of formulas evaluated by recursion before giving up.
/// Acyclic chains are settled iteratively and never get near it.
const MAX_EVAL_DEPTH: usize = 32;

/// One resolved entry: the value and its display text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    #[serde(flatten)]
    pub value: ResolvedValue,
    pub text: String,
}

/// Every resolved value of one template/value-map pair, keyed as in the module docs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Resolution {
    entries: BTreeMap<String, Resolved>,
}

impl Resolution {
    pub fn get(&self, key: &str) -> Option<&Resolved> {
        self.entries.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&ResolvedValue> {
        self.get(key).map(|r| &r.value)
    }

    /// Display text for `key`; empty when unknown.
    pub fn display(&self, key: &str) -> &str {
        self.get(key).map(|r| r.text.as_str()).unwrap_or("")
    }

    /// Numeric value for `key`, if it resolved to a number.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.value(key).and_then(ResolvedValue::as_number)
    }

    /// Every key whose formula failed, in key order.
    pub fn errors(&self) -> Vec<(&str, &ValueError)> {
        self.entries
            .iter()
            .filter_map(|(k, r)| match &r.value {
                ResolvedValue::Error(e) => Some((k.as_str(), e)),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Resolved)> {
        self.entries.iter()
    }

    fn insert(&mut self, key: String, value: ResolvedValue, decimals: u8) {
        let text = value.display(decimals);
        self.entries.insert(key, Resolved { value, text });
    }
}

/// What an indexed key refers to.
#[derive(Clone, Copy)]
enum Node<'a> {
    Field(&'a Field),
    Cell {
        table: &'a Field,
        row: usize,
        column: &'a TableColumn,
    },
    Column {
        table: &'a Field,
        column: &'a TableColumn,
    },
    Member {
        group: &'a Field,
        sub: &'a Field,
    },
}

/// Where a formula lives, which decides how bare names resolve first.
#[derive(Clone, Copy)]
enum Context<'a> {
    Top,
    Row { table: &'a Field, row: usize },
    Group { group: &'a Field },
}

/// Resolves one template against one value map.
pub struct Resolver<'a> {
    template: &'a Template,
    values: &'a ValueMap,
    nodes: HashMap<String, Node<'a>>,
    memo: HashMap<String, Result<f64, EvalError>>,
    evaluating: HashSet<String>,
    parsed: HashMap<&'a str, Result<Rc<Expr>, FormulaError>>,
}

impl<'a> Resolver<'a> {
    pub fn new(template: &'a Template, values: &'a ValueMap) -> Self {
        let mut nodes = HashMap::new();
        for field in &template.fields {
            // First definition wins on duplicate ids; validation reports them.
            nodes.entry(field.id.clone()).or_insert(Node::Field(field));

            if let Some(table) = field.table() {
                for column in &table.columns {
                    nodes
                        .entry(group_key(&field.id, &column.id))
                        .or_insert(Node::Column { table: field, column });
                    for row in 0..table.rows {
                        nodes
                            .entry(cell_key(&field.id, row, &column.id))
                            .or_insert(Node::Cell {
                                table: field,
                                row,
                                column,
                            });
                    }
                }
            }

            if let Some(group) = field.group() {
                for sub in group.all_fields() {
                    nodes
                        .entry(group_key(&field.id, &sub.id))
                        .or_insert(Node::Member { group: field, sub });
                }
            }
        }

        Self {
            template,
            values,
            nodes,
            memo: HashMap::new(),
            evaluating: HashSet::new(),
            parsed: HashMap::new(),
        }
    }

    /// Resolve every field, table cell and group sub-field.
    pub fn resolve(mut self) -> Resolution {
        let template = self.template;
        let mut out = Resolution::default();

        for field in &template.fields {
            let decimals = field.style.decimals;

            if let Some(table) = field.table() {
                for row in 0..table.rows {
                    for column in &table.columns {
                        let key = cell_key(&field.id, row, &column.id);
                        let value = match column.formula() {
                            Some(src) => self.formula_value(
                                &key,
                                src,
                                Context::Row { table: field, row },
                                column.column_type,
                            ),
                            None => interpret(column.column_type, self.values.get(&key), None),
                        };
                        out.insert(key, value, decimals);
                    }
                }
            }

            if let Some(group) = field.group() {
                for sub in group.all_fields() {
                    let key = group_key(&field.id, &sub.id);
                    let value = match sub.formula() {
                        Some(src) => {
                            self.formula_value(&key, src, Context::Group { group: field }, sub.field_type)
                        }
                        None => interpret(
                            sub.field_type,
                            self.values.group_value(&field.id, &sub.id),
                            sub.format.as_deref(),
                        ),
                    };
                    out.insert(key, value, sub.style.decimals);
                }
            }

            if out.get(&field.id).is_some() {
                continue;
            }
            let value = match field.formula() {
                Some(src) => self.formula_value(&field.id, src, Context::Top, field.field_type),
                None => interpret(field.field_type, self.values.get(&field.id), field.format.as_deref()),
            };
            out.insert(field.id.clone(), value, decimals);
        }

        let errors = out.errors().len();
        debug!(entries = out.len(), errors, "resolved template '{}'", template.name);
        out
    }

    /// Evaluate an ad-hoc formula against the same scope as the template's fields.
    pub fn resolve_formula(&mut self, src: &str) -> ResolvedValue {
        let expr = match formula::parse(src) {
            Ok(expr) => expr,
            Err(e) => return ResolvedValue::Error(ValueError::Invalid(e.to_string())),
        };
        let mut frame = Frame {
            resolver: self,
            context: Context::Top,
        };
        match expr.eval(&mut frame) {
            Ok(n) => ResolvedValue::Number(n),
            Err(e) => ResolvedValue::Error(e.into()),
        }
    }

    fn formula_value(
        &mut self,
        key: &str,
        src: &'a str,
        context: Context<'a>,
        field_type: FieldType,
    ) -> ResolvedValue {
        match self.evaluate(key, src, context) {
            Ok(n) if field_type == FieldType::Checkbox => ResolvedValue::Bool(n != 0.0),
            Ok(n) => ResolvedValue::Number(n),
            Err(e) => ResolvedValue::Error(e.into()),
        }
    }

    /// Numeric value of a name once the formula context has been applied.
    fn lookup_key(&mut self, key: &str) -> Result<Operand, EvalError> {
        match self.nodes.get(key).copied() {
            Some(Node::Column { table, column }) => {
                let rows = table.table().map(|t| t.rows).unwrap_or(0);
                let mut items = Vec::with_capacity(rows);
                for row in 0..rows {
                    let cell = Node::Cell { table, row, column };
                    items.push(self.scalar(&cell_key(&table.id, row, &column.id), cell)?);
                }
                Ok(Operand::List(items))
            }
            Some(node) => self.scalar(key, node).map(Operand::Scalar),
            None => match self.values.get(key) {
                Some(raw) => Ok(Operand::Scalar(to_number(raw))),
                None => {
                    debug!(reference = key, "dangling reference evaluates to 0");
                    Ok(Operand::Scalar(0.0))
                }
            },
        }
    }

    fn scalar(&mut self, key: &str, node: Node<'a>) -> Result<f64, EvalError> {
        let values = self.values;
        match node {
            Node::Field(field) => match field.formula() {
                Some(src) => self.evaluate(key, src, Context::Top),
                None => Ok(values.number(&field.id)),
            },
            Node::Cell { table, row, column } => match column.formula() {
                Some(src) => self.evaluate(key, src, Context::Row { table, row }),
                None => Ok(values.cell(&table.id, row, &column.id).map(to_number).unwrap_or(0.0)),
            },
            Node::Member { group, sub } => match sub.formula() {
                Some(src) => self.evaluate(key, src, Context::Group { group }),
                None => Ok(values
                    .group_value(&group.id, &sub.id)
                    .map(to_number)
                    .unwrap_or(0.0)),
            },
            Node::Column { .. } => self.lookup_key(key).map(|op| match op {
                Operand::Scalar(n) => n,
                Operand::List(items) => items.iter().sum(),
            }),
        }
    }

    /// Evaluate a formula key. From the outermost call, every formula it
    /// depends on is settled first so the recursion below stays shallow.
    fn evaluate(&mut self, key: &str, src: &'a str, context: Context<'a>) -> Result<f64, EvalError> {
        if self.evaluating.is_empty() && !self.memo.contains_key(key) {
            self.settle(key, src, context);
        }
        self.compute(key, src, context)
    }

    fn compute(&mut self, key: &str, src: &'a str, context: Context<'a>) -> Result<f64, EvalError> {
        if let Some(done) = self.memo.get(key) {
            return done.clone();
        }
        if self.evaluating.contains(key) {
            debug!(key, "circular reference");
            return Err(EvalError::CircularReference(key.to_string()));
        }
        if self.evaluating.len() >= MAX_EVAL_DEPTH {
            debug!(key, depth = self.evaluating.len(), "reference chain too deep");
            return Err(EvalError::TooDeep(MAX_EVAL_DEPTH));
        }

        let expr = match self.parse(src) {
            Ok(expr) => expr,
            Err(e) => {
                let err = EvalError::Invalid(e.to_string());
                self.memo.insert(key.to_string(), Err(err.clone()));
                return Err(err);
            }
        };

        self.evaluating.insert(key.to_string());
        let result = {
            let mut frame = Frame {
                resolver: self,
                context,
            };
            expr.eval(&mut frame)
        };
        self.evaluating.remove(key);

        self.memo.insert(key.to_string(), result.clone());
        result
    }

    /// Compute the formula dependencies of `root` deepest-first with an
    /// explicit stack. Afterwards `root` only recurses into memoized keys,
    /// except along cycles.
    fn settle(&mut self, root: &str, src: &'a str, context: Context<'a>) {
        let mut seen: HashSet<String> = HashSet::from([root.to_string()]);
        let mut stack = vec![(root.to_string(), src, context, false)];

        while let Some((key, src, context, expanded)) = stack.pop() {
            if expanded {
                if key != root {
                    // Errors are memoized; dependents read them from there.
                    let _ = self.compute(&key, src, context);
                }
                continue;
            }
            stack.push((key, src, context, true));
            for (dep, dep_src, dep_context) in self.dependencies(src, context) {
                if self.memo.contains_key(&dep) || !seen.insert(dep.clone()) {
                    continue;
                }
                stack.push((dep, dep_src, dep_context, false));
            }
        }
    }

    /// Formula-bearing keys a formula may read, including the untaken `IF` branch.
    fn dependencies(&mut self, src: &'a str, context: Context<'a>) -> Vec<(String, &'a str, Context<'a>)> {
        let Ok(expr) = self.parse(src) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for name in expr.references() {
            let key = scoped_key(context, name);
            match self.nodes.get(&key).copied() {
                Some(Node::Column { table, column }) => {
                    let Some(formula) = column.formula() else {
                        continue;
                    };
                    let rows = table.table().map(|t| t.rows).unwrap_or(0);
                    for row in 0..rows {
                        out.push((
                            cell_key(&table.id, row, &column.id),
                            formula,
                            Context::Row { table, row },
                        ));
                    }
                }
                Some(node) => {
                    if let Some(dep) = formula_of(node) {
                        out.push((key, dep.0, dep.1));
                    }
                }
                None => {}
            }
        }
        out
    }

    /// Parse once per distinct formula text; column formulas share one parse.
    fn parse(&mut self, src: &'a str) -> Result<Rc<Expr>, FormulaError> {
        self.parsed
            .entry(src)
            .or_insert_with(|| formula::parse(src).map(Rc::new))
            .clone()
    }
}

/// A resolver seen from inside one formula.
struct Frame<'r, 'a> {
    resolver: &'r mut Resolver<'a>,
    context: Context<'a>,
}

impl Scope for Frame<'_, '_> {
    fn lookup(&mut self, name: &str) -> Result<Operand, EvalError> {
        let key = scoped_key(self.context, name);
        self.resolver.lookup_key(&key)
    }
}

/// The key a bare name refers to inside `context`: same-row column or group
/// sibling first, otherwise the name itself.
fn scoped_key(context: Context<'_>, name: &str) -> String {
    match context {
        Context::Row { table, row } if table.table().is_some_and(|t| t.column(name).is_some()) => {
            cell_key(&table.id, row, name)
        }
        Context::Group { group }
            if group
                .group()
                .is_some_and(|g| g.all_fields().any(|f| f.id == name)) =>
        {
            group_key(&group.id, name)
        }
        _ => name.to_string(),
    }
}

/// Formula text and evaluation context of a single-valued node.
fn formula_of(node: Node<'_>) -> Option<(&str, Context<'_>)> {
    match node {
        Node::Field(field) => field.formula().map(|f| (f, Context::Top)),
        Node::Cell { table, row, column } => column.formula().map(|f| (f, Context::Row { table, row })),
        Node::Member { group, sub } => sub.formula().map(|f| (f, Context::Group { group })),
        Node::Column { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::FieldType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn values(v: serde_json::Value) -> ValueMap {
        serde_json::from_value(v).unwrap()
    }

    fn invoice() -> Template {
        Template::new("invoice")
            .field(Field::new("items", FieldType::Table).with_table(
                2,
                vec![
                    TableColumn::new("qty"),
                    TableColumn::new("price"),
                    TableColumn::new("total").with_formula("qty * price"),
                ],
            ))
            .field(Field::new("subtotal", FieldType::Number).with_formula("SUM(items.total)"))
            .field(Field::new("tax", FieldType::Number).with_formula("subtotal * tax_rate"))
            .field(Field::new("grand", FieldType::Number).with_formula("subtotal + tax"))
    }

    #[test]
    fn test_table_column_formulas_and_aggregates() {
        let template = invoice();
        let v = values(json!({
            "items": [{"qty": 2, "price": 3.5}, {"qty": "1", "price": "10"}],
            "tax_rate": 0.1,
        }));
        let r = Resolver::new(&template, &v).resolve();

        assert_eq!(r.number("items_0_total"), Some(7.0));
        assert_eq!(r.number("items_1_total"), Some(10.0));
        assert_eq!(r.number("subtotal"), Some(17.0));
        assert_eq!(r.display("tax"), "1.7");
        assert_eq!(r.display("grand"), "18.7");
        assert!(r.errors().is_empty());
    }

    #[test]
    fn test_circular_reference_marks_cycle_and_dependents() {
        let template = Template::new("loop")
            .field(Field::new("a", FieldType::Number).with_formula("b + 1"))
            .field(Field::new("b", FieldType::Number).with_formula("a + 1"))
            .field(Field::new("c", FieldType::Number).with_formula("a * 2"))
            .field(Field::new("d", FieldType::Number).with_formula("5"));
        let r = Resolver::new(&template, &ValueMap::new()).resolve();

        for key in ["a", "b", "c"] {
            assert!(
                matches!(r.value(key), Some(ResolvedValue::Error(ValueError::Circular(_)))),
                "{key} should be circular"
            );
            assert_eq!(r.display(key), "#CIRC!");
        }
        assert_eq!(r.number("d"), Some(5.0));
        assert_eq!(r.errors().len(), 3);
    }

    #[test]
    fn test_self_reference_in_column() {
        let template = Template::new("t").field(
            Field::new("rows", FieldType::Table)
                .with_table(1, vec![TableColumn::new("x").with_formula("x + 1")]),
        );
        let r = Resolver::new(&template, &ValueMap::new()).resolve();
        assert_eq!(r.display("rows_0_x"), "#CIRC!");
    }

    #[test]
    fn test_group_sibling_and_dotted_references() {
        let template = Template::new("g")
            .field(Field::new("dims", FieldType::Group).with_group(vec![
                Field::new("w", FieldType::Number),
                Field::new("h", FieldType::Number),
                Field::new("area", FieldType::Number).with_formula("w * h"),
            ]))
            .field(Field::new("double", FieldType::Number).with_formula("dims.area * 2"));
        let v = values(json!({"dims": {"w": 3, "h": "4"}}));
        let r = Resolver::new(&template, &v).resolve();

        assert_eq!(r.number("dims.area"), Some(12.0));
        assert_eq!(r.number("double"), Some(24.0));
        assert_eq!(r.value("dims.w"), Some(&ResolvedValue::Number(3.0)));
    }

    #[test]
    fn test_same_row_column_wins_over_field_id() {
        let template = Template::new("t")
            .field(Field::new("qty", FieldType::Number))
            .field(Field::new("lines", FieldType::Table).with_table(
                1,
                vec![
                    TableColumn::new("qty"),
                    TableColumn::new("double").with_formula("qty * 2"),
                ],
            ));
        let v = values(json!({"qty": 100, "lines_0_qty": 4}));
        let r = Resolver::new(&template, &v).resolve();
        assert_eq!(r.number("lines_0_double"), Some(8.0));
    }

    #[test]
    fn test_dangling_reference_is_zero() {
        let template = Template::new("t")
            .field(Field::new("x", FieldType::Number).with_formula("missing + 1"));
        let r = Resolver::new(&template, &ValueMap::new()).resolve();
        assert_eq!(r.number("x"), Some(1.0));
    }

    #[test]
    fn test_formula_errors() {
        let template = Template::new("t")
            .field(Field::new("zero", FieldType::Number))
            .field(Field::new("ratio", FieldType::Number).with_formula("10 / zero"))
            .field(Field::new("bad", FieldType::Number).with_formula("1 +"));
        let r = Resolver::new(&template, &ValueMap::new()).resolve();
        assert_eq!(r.display("ratio"), "#DIV/0!");
        assert_eq!(r.display("bad"), "#ERROR!");
    }

    #[test]
    fn test_resolve_formula_ad_hoc() {
        let template = invoice();
        let v = values(json!({"items_0_qty": 2, "items_0_price": 5}));
        let mut resolver = Resolver::new(&template, &v);
        assert_eq!(resolver.resolve_formula("=grand"), ResolvedValue::Number(10.0));
        assert_eq!(resolver.resolve_formula("COUNT(items.qty)"), ResolvedValue::Number(2.0));
        assert!(matches!(
            resolver.resolve_formula("FOO(1)"),
            ResolvedValue::Error(ValueError::Invalid(_))
        ));
    }

    #[test]
    fn test_non_formula_values_by_type() {
        let template = Template::new("t")
            .field(Field::new("name", FieldType::Text))
            .field(Field::new("ok", FieldType::Checkbox))
            .field(Field::new("blank", FieldType::Email));
        let v = values(json!({"name": "Ada", "ok": true}));
        let r = Resolver::new(&template, &v).resolve();
        assert_eq!(r.display("name"), "Ada");
        assert_eq!(r.value("ok"), Some(&ResolvedValue::Bool(true)));
        assert_eq!(r.value("blank"), Some(&ResolvedValue::Empty));
    }

    /// `f0 = 1`, `f{i} = f{i-1} + 1`, listed last-to-first.
    fn chain(len: usize) -> Template {
        let mut template = Template::new("chain");
        for i in (0..len).rev() {
            let formula = if i == 0 {
                "1".to_string()
            } else {
                format!("f{} + 1", i - 1)
            };
            template = template.field(Field::new(format!("f{}", i), FieldType::Number).with_formula(formula));
        }
        template
    }

    #[test]
    fn test_long_reference_chain_resolves() {
        let template = chain(5000);
        let r = Resolver::new(&template, &ValueMap::new()).resolve();
        assert_eq!(r.number("f4999"), Some(5000.0));
        assert_eq!(r.number("f0"), Some(1.0));
        assert!(r.errors().is_empty());

        let values = ValueMap::new();
        let mut resolver = Resolver::new(&template, &values);
        assert_eq!(resolver.resolve_formula("f4999 * 2"), ResolvedValue::Number(10000.0));
    }

    #[test]
    fn test_long_cycle_fails_without_overflow() {
        let n = 3000;
        let mut template = Template::new("ring");
        for i in 0..n {
            template = template.field(
                Field::new(format!("r{}", i), FieldType::Number).with_formula(format!("r{} + 1", (i + 1) % n)),
            );
        }
        template = template.field(Field::new("outside", FieldType::Number).with_formula("2"));

        let r = Resolver::new(&template, &ValueMap::new()).resolve();
        for i in [0, 1, n / 2, n - 1] {
            assert!(
                matches!(r.value(&format!("r{}", i)), Some(ResolvedValue::Error(_))),
                "r{i} should fail"
            );
        }
        assert_eq!(r.number("outside"), Some(2.0));
    }

    #[test]
    fn test_large_formula_column_aggregate() {
        let rows = 2000;
        let mut template = Template::new("ledger").field(
            Field::new("t", FieldType::Table)
                .with_table(rows, vec![TableColumn::new("amount"), TableColumn::new("balance").with_formula("amount")]),
        );
        template = template.field(Field::new("total", FieldType::Number).with_formula("SUM(t.balance)"));
        let mut v = ValueMap::new();
        for row in 0..rows {
            v.insert(cell_key("t", row, "amount"), json!(1));
        }
        let r = Resolver::new(&template, &v).resolve();
        assert_eq!(r.number("total"), Some(rows as f64));
    }

    #[test]
    fn test_checkbox_formula_resolves_to_bool() {
        let template = Template::new("flags")
            .field(Field::new("hours", FieldType::Number))
            .field(Field::new("overtime", FieldType::Checkbox).with_formula("hours > 40"))
            .field(Field::new("short", FieldType::Checkbox).with_formula("hours < 10"))
            .field(Field::new("bonus", FieldType::Number).with_formula("overtime * 100"))
            .field(Field::new("shifts", FieldType::Table).with_table(
                1,
                vec![
                    TableColumn::new("n"),
                    TableColumn {
                        column_type: FieldType::Checkbox,
                        ..TableColumn::new("busy").with_formula("n >= 3")
                    },
                ],
            ));
        let v = values(json!({"hours": 45, "shifts": [{"n": 4}]}));
        let r = Resolver::new(&template, &v).resolve();

        assert_eq!(r.value("overtime"), Some(&ResolvedValue::Bool(true)));
        assert_eq!(r.value("short"), Some(&ResolvedValue::Bool(false)));
        assert_eq!(r.number("bonus"), Some(100.0));
        assert_eq!(r.value("shifts_0_busy"), Some(&ResolvedValue::Bool(true)));
    }
}
