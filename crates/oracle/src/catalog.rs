//! The method catalogue: how each known method is probed.

use std::fmt;

use crate::marker::{marker, marker_number, Role};
use crate::target::{Arg, Call};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Expected to return a branch-safe handle.
    ImmutableReturn,
    /// Builds up query state and returns the handle.
    Chain,
    /// Executes the query.
    Finisher,
    Transaction,
    /// Takes a callback over the handle.
    Callback,
    Utility,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::ImmutableReturn => "immutable-return",
            Category::Chain => "chain",
            Category::Finisher => "finisher",
            Category::Transaction => "transaction",
            Category::Callback => "callback",
            Category::Utility => "utility",
        };
        write!(f, "{}", s)
    }
}

/// Survey priority; [`Catalog::in_survey_order`] puts `High` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High = 1,
    Medium = 2,
    Low = 3,
}

/// How a marker is embedded in a method's arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgShape {
    /// `("<m> = ?", true)`
    Condition,
    /// `("<m>")` used as a column, table or value name.
    Column,
    /// A raw SQL fragment; `{m}` in the template is replaced by the marker.
    Raw { template: &'static str },
    /// `("<m> = 1")` passed as an inline finisher condition.
    InlineCondition,
    /// An integer observed as `<keyword> <n>` in the rendered statement.
    Integer { keyword: &'static str },
    /// A callback over the handle.
    Scope,
    /// A relation name followed by a callback over the handle.
    RelationCallback { relation: &'static str },
    /// No arguments; applying the method makes `needle` appear.
    NullaryWithNeedle { needle: &'static str },
    /// A finisher without arguments. The marker rides on a tagged chain
    /// call made on the receiver just before the finisher runs.
    Chained,
    /// No arguments and nothing observable on the receiver.
    Nullary,
}

/// A concrete call plus the text that reveals it in recorded effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCall {
    pub call: Call,
    pub needle: Option<String>,
}

/// Probe plan for one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodPlan {
    pub name: String,
    pub category: Category,
    pub priority: Priority,
    pub shape: ArgShape,
    /// The method runs its effect as part of the invocation.
    pub completes_on_invoke: bool,
    /// Run the finisher-retention probe.
    pub retention: bool,
    /// Finisher whose effect reveals the method's state, when a plain
    /// terminal call does not render it.
    pub observer: Option<&'static str>,
    /// Surfaced on the classification's purity note.
    pub note: &'static str,
}

impl MethodPlan {
    pub fn new(name: &str, category: Category, priority: Priority, shape: ArgShape) -> Self {
        MethodPlan {
            name: name.to_string(),
            category,
            priority,
            shape,
            completes_on_invoke: false,
            retention: false,
            observer: None,
            note: "",
        }
    }

    pub fn completes(mut self) -> Self {
        self.completes_on_invoke = true;
        self
    }

    pub fn retains(mut self) -> Self {
        self.retention = true;
        self
    }

    pub fn observed_by(mut self, finisher: &'static str) -> Self {
        self.observer = Some(finisher);
        self
    }

    pub fn note(mut self, note: &'static str) -> Self {
        self.note = note;
        self
    }

    /// Plan for a nullary method found on the handle but absent from the
    /// catalogue. Methods with arguments cannot be probed without knowing
    /// what their arguments mean.
    pub fn derived(name: &str) -> Self {
        MethodPlan::new(name, Category::Utility, Priority::Low, ArgShape::Nullary)
            .note("derived from signature")
    }

    /// True if applying the method leaves a recognizable trace.
    pub fn is_observable(&self) -> bool {
        !matches!(self.shape, ArgShape::Nullary)
    }

    /// True if two applications with different markers can be told apart.
    pub fn distinguishes_repeats(&self) -> bool {
        !matches!(
            self.shape,
            ArgShape::Nullary | ArgShape::NullaryWithNeedle { .. } | ArgShape::Chained
        )
    }

    /// Build the call for `role`.
    pub fn call(&self, role: Role) -> ProbeCall {
        let m = marker(&self.name, role);
        let (args, needle) = match &self.shape {
            ArgShape::Condition => (
                vec![Arg::Text(format!("{} = ?", m)), Arg::Bool(true)],
                Some(m),
            ),
            ArgShape::Column => (vec![Arg::Text(m.clone())], Some(m)),
            ArgShape::Raw { template } => (vec![Arg::Text(template.replace("{m}", &m))], Some(m)),
            ArgShape::InlineCondition => (vec![Arg::Text(format!("{} = 1", m))], Some(m)),
            ArgShape::Integer { keyword } => {
                let n = marker_number(&self.name, role);
                (vec![Arg::Int(n)], Some(format!("{} {}", keyword, n)))
            }
            ArgShape::Scope => (vec![Arg::Callback { marker: m.clone() }], Some(m)),
            ArgShape::RelationCallback { relation } => (
                vec![
                    Arg::Text(relation.to_string()),
                    Arg::Callback { marker: m.clone() },
                ],
                Some(m),
            ),
            ArgShape::NullaryWithNeedle { needle } => (vec![], Some(needle.to_string())),
            ArgShape::Chained => (vec![], Some(m)),
            ArgShape::Nullary => (vec![], None),
        };
        ProbeCall {
            call: Call::new(self.name.clone(), args),
            needle,
        }
    }
}

/// The set of methods the oracle knows how to probe, sorted by name.
#[derive(Debug, Clone)]
pub struct Catalog {
    plans: Vec<MethodPlan>,
}

impl Catalog {
    pub fn new(mut plans: Vec<MethodPlan>) -> Self {
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        plans.dedup_by(|a, b| a.name == b.name);
        Catalog { plans }
    }

    /// Plans for the fluent query-builder surface.
    pub fn standard() -> Self {
        use ArgShape::*;
        use Category::*;
        use Priority::*;

        let p = MethodPlan::new;
        Catalog::new(vec![
            // Expected branch-safe returns.
            p("Session", ImmutableReturn, Low, Nullary).note("creates a new statement"),
            p("WithContext", ImmutableReturn, Low, Nullary).note("calls Session"),
            p(
                "Debug",
                ImmutableReturn,
                Low,
                NullaryWithNeedle {
                    needle: "/* debug */",
                },
            )
            .note("calls Session"),
            p("Begin", ImmutableReturn, Low, Nullary).note("starts a transaction"),
            // Chain methods.
            p("Where", Chain, High, Condition),
            p("Or", Chain, High, Condition),
            p("Not", Chain, High, Condition),
            p("Select", Chain, High, Column),
            p("Order", Chain, High, Column),
            p("Group", Chain, Medium, Column),
            p("Having", Chain, High, Condition),
            p(
                "Joins",
                Chain,
                High,
                Raw {
                    template: "JOIN {m} ON {m}.user_id = users.id",
                },
            ),
            p(
                "InnerJoins",
                Chain,
                High,
                Raw {
                    template: "JOIN {m} ON {m}.user_id = users.id",
                },
            ),
            p(
                "Preload",
                Chain,
                High,
                RelationCallback { relation: "Orders" },
            )
            .note("callback may share state"),
            p("Distinct", Chain, Medium, Column),
            p("Limit", Chain, Medium, Integer { keyword: "limit" }),
            p("Offset", Chain, Medium, Integer { keyword: "offset" }),
            p("Omit", Chain, Medium, Column),
            p("Model", Chain, High, Column),
            p("Table", Chain, Medium, Column),
            p("Unscoped", Chain, Medium, Nullary),
            p("Clauses", Chain, Medium, Column).note("marker is an order-by column"),
            p("Assign", Chain, Low, Column)
                .observed_by("FirstOrCreate")
                .note("assignments only render in FirstOrCreate"),
            p("Attrs", Chain, Low, Column)
                .observed_by("FirstOrCreate")
                .note("attributes only render in FirstOrCreate"),
            p("MapColumns", Chain, Low, Column),
            p(
                "Raw",
                Chain,
                Medium,
                Raw {
                    template: "SELECT * FROM users WHERE {m} = 1",
                },
            ),
            // Finishers.
            p("Find", Finisher, High, InlineCondition).completes(),
            p("First", Finisher, High, InlineCondition).completes(),
            p("Take", Finisher, High, InlineCondition).completes(),
            p("Last", Finisher, High, InlineCondition).completes(),
            p("Count", Finisher, Medium, Chained)
                .completes()
                .retains()
                .note("may discard joins"),
            p("Scan", Finisher, Low, Chained).completes(),
            p("FirstOrCreate", Finisher, Medium, InlineCondition).completes(),
            p("FirstOrInit", Finisher, Medium, InlineCondition).completes(),
            p("Save", Finisher, Medium, Column).completes().note("upsert"),
            p("Pluck", Finisher, Medium, Column).completes(),
            p("Create", Finisher, Medium, Column).completes(),
            p("CreateInBatches", Finisher, Medium, Column).completes(),
            p("Update", Finisher, Medium, Column).completes(),
            p("Updates", Finisher, Medium, Column).completes(),
            p("Delete", Finisher, Medium, InlineCondition).completes(),
            p(
                "Exec",
                Finisher,
                Medium,
                Raw {
                    template: "UPDATE users SET {m} = 1",
                },
            )
            .completes(),
            p("Row", Finisher, Low, Chained).completes(),
            p("Rows", Finisher, Low, Chained).completes(),
            // Transactions.
            p("Commit", Transaction, Medium, Nullary).completes(),
            p("Rollback", Transaction, Medium, Nullary).completes(),
            // Callbacks over the handle.
            p("Scopes", Callback, High, Scope),
            p("Transaction", Callback, Medium, Scope).completes(),
            p("Connection", Callback, Medium, Scope).completes(),
            p("FindInBatches", Callback, Medium, Scope).completes(),
            p("ToSQL", Callback, Low, Scope).completes(),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&MethodPlan> {
        self.plans
            .binary_search_by(|p| p.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.plans[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &MethodPlan> {
        self.plans.iter()
    }

    /// Plans by priority, then name.
    pub fn in_survey_order(&self) -> Vec<&MethodPlan> {
        let mut plans: Vec<&MethodPlan> = self.plans.iter().collect();
        plans.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        plans
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn callback_methods(&self) -> Vec<&MethodPlan> {
        self.plans
            .iter()
            .filter(|p| {
                matches!(
                    p.shape,
                    ArgShape::Scope | ArgShape::RelationCallback { .. }
                )
            })
            .collect()
    }

    pub fn high_priority(&self) -> Vec<&MethodPlan> {
        self.plans
            .iter()
            .filter(|p| p.priority == Priority::High)
            .collect()
    }

    pub fn by_category(&self, category: Category) -> Vec<&MethodPlan> {
        self.plans
            .iter()
            .filter(|p| p.category == category)
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::standard()
    }
}
