use ooquery::{
    from_tree, parse, to_tree, BoolExpr, Condition, DomainItem, ForeignKey, JoinSession, Literal,
};
use proptest::prelude::*;

const FIELDS: [&str; 4] = ["a", "b", "c", "d"];

fn arb_condition() -> impl Strategy<Value = Condition> {
    let op = prop_oneof![
        Just("="),
        Just("!="),
        Just("<"),
        Just(">="),
        Just("like"),
        Just("not ilike"),
        Just("ilike"),
    ];
    (prop::sample::select(FIELDS.to_vec()), op, any::<i64>())
        .prop_map(|(field, op, value)| Condition::new(field, op, value))
}

fn arb_membership() -> impl Strategy<Value = Condition> {
    (
        prop::sample::select(FIELDS.to_vec()),
        prop_oneof![Just("in"), Just("not in")],
        prop::collection::vec("[a-z]{1,4}", 0..4),
    )
        .prop_map(|(field, op, values)| Condition::new(field, op, values))
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(Condition),
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
}

fn arb_node() -> impl Strategy<Value = Node> {
    arb_condition()
        .prop_map(Node::Leaf)
        .prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 2..4).prop_map(Node::And),
                prop::collection::vec(inner.clone(), 2..4).prop_map(Node::Or),
                inner.prop_map(|n| Node::Not(Box::new(n))),
            ]
        })
}

/// Same shapes without `!`, which has no rule-tree form.
fn arb_positive_node() -> impl Strategy<Value = Node> {
    arb_condition()
        .prop_map(Node::Leaf)
        .prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 2..4).prop_map(Node::And),
                prop::collection::vec(inner, 2..4).prop_map(Node::Or),
            ]
        })
}

/// Prefix form with `k - 1` leading markers per k-ary node.
fn write_prefix(node: &Node, out: &mut Vec<DomainItem>) {
    let (marker, children): (fn() -> DomainItem, &[Node]) = match node {
        Node::Leaf(c) => {
            out.push(DomainItem::Condition(c.clone()));
            return;
        }
        Node::Not(inner) => {
            out.push(DomainItem::not());
            write_prefix(inner, out);
            return;
        }
        Node::And(children) => (DomainItem::and, children),
        Node::Or(children) => (DomainItem::or, children),
    };
    out.extend(std::iter::repeat_with(marker).take(children.len() - 1));
    for child in children {
        write_prefix(child, out);
    }
}

fn count_leaves(node: &Node) -> usize {
    match node {
        Node::Leaf(_) => 1,
        Node::Not(inner) => count_leaves(inner),
        Node::And(children) | Node::Or(children) => children.iter().map(count_leaves).sum(),
    }
}

/// Canonical domain: implicit AND of conditions and flat OR groups.
fn arb_canonical_domain() -> impl Strategy<Value = Vec<DomainItem>> {
    let group = prop_oneof![
        prop_oneof![arb_condition(), arb_membership()].prop_map(|c| vec![c]),
        prop::collection::vec(arb_condition(), 2..5),
    ];
    prop::collection::vec(group, 0..5).prop_map(|groups| {
        let mut domain = Vec::new();
        for group in groups {
            domain.extend(std::iter::repeat_with(DomainItem::or).take(group.len() - 1));
            domain.extend(group.into_iter().map(DomainItem::Condition));
        }
        domain
    })
}

fn self_referential(table: &str, field: &str) -> Option<ForeignKey> {
    match (table, field) {
        ("node", "parent_id") => Some(ForeignKey::new("node", "parent_id", "id")),
        ("node", "owner_id") => Some(ForeignKey::new("owner", "owner_id", "id")),
        ("owner", "node_id") => Some(ForeignKey::new("node", "node_id", "id")),
        _ => None,
    }
}

fn arb_path() -> impl Strategy<Value = Vec<&'static str>> {
    prop::collection::vec(prop::sample::select(vec!["parent_id", "owner_id"]), 1..4).prop_map(
        |hops| {
            // owner only links back through node_id
            let mut path = Vec::new();
            let mut on_owner = false;
            for hop in hops {
                let hop = if on_owner { "node_id" } else { hop };
                on_owner = hop == "owner_id";
                path.push(hop);
            }
            path
        },
    )
}

proptest! {
    #[test]
    fn implicit_and_keeps_every_condition(conditions in prop::collection::vec(arb_condition(), 0..8)) {
        let domain: Vec<_> = conditions.iter().cloned().map(DomainItem::Condition).collect();
        let parsed = parse(&domain).unwrap();

        let BoolExpr::And(children) = &parsed else {
            panic!("root must be an And");
        };
        prop_assert_eq!(children.len(), conditions.len());
        let leaves: Vec<_> = parsed.leaves().into_iter().cloned().collect();
        prop_assert_eq!(leaves, conditions);
    }

    #[test]
    fn parsed_trees_are_flat(node in arb_node()) {
        let mut domain = Vec::new();
        write_prefix(&node, &mut domain);
        let parsed = parse(&domain).unwrap();

        prop_assert!(parsed.is_flat());
        prop_assert_eq!(parsed.leaves().len(), count_leaves(&node));
    }

    #[test]
    fn rule_trees_are_flat(node in arb_positive_node()) {
        let mut domain = Vec::new();
        write_prefix(&node, &mut domain);
        prop_assert!(to_tree(&domain).unwrap().is_flat());
    }

    #[test]
    fn canonical_domains_round_trip(domain in arb_canonical_domain()) {
        let tree = to_tree(&domain).unwrap();
        prop_assert_eq!(from_tree(&tree), domain);
    }

    #[test]
    fn join_resolution_is_idempotent(path in arb_path()) {
        let mut session = JoinSession::new("node", &self_referential);
        let field = format!("{}.code", path.join("."));

        let first = session.resolve_field(&field).unwrap();
        let joins = session.joins().len();
        let second = session.resolve_field(&field).unwrap();

        prop_assert_eq!(joins, path.len());
        prop_assert_eq!(session.joins().len(), joins);
        prop_assert_eq!(first, second);
    }
}

#[test]
fn membership_lists_survive_round_trip() {
    let domain = vec![DomainItem::cond("tags", "in", Literal::List(vec![]))];
    assert_eq!(from_tree(&to_tree(&domain).unwrap()), domain);
}
