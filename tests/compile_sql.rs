use ooquery::config::ForeignKeyConfig;
use ooquery::{
    domain, CompareOp, CustomJoin, Dialect, Error, ForeignKey, JoinKind, OOQuery, SelectOptions, SqlCompiler,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn sale_schema() -> ForeignKeyConfig {
    let mut fks = ForeignKeyConfig::default();
    fks.insert("sale_order", "partner_id", ForeignKey::new("res_partner", "partner_id", "id"));
    fks.insert("sale_order", "user_id", ForeignKey::new("res_users", "user_id", "id"));
    fks.insert("res_partner", "parent_id", ForeignKey::new("res_partner", "parent_id", "id"));
    fks.insert("res_partner", "country_id", ForeignKey::new("res_country", "country_id", "id"));
    fks
}

#[test]
fn plain_filter_renders_exactly() {
    let fks = sale_schema();
    let domain = domain::from_json(&json!([["amount", ">", 100]])).unwrap();
    let sql = SqlCompiler::new("sale_order", &fks).to_sql(&domain).unwrap();
    assert_eq!(sql, r#"SELECT * FROM "sale_order" AS "t0" WHERE "t0"."amount" > 100"#);
}

#[test]
fn relational_domain_from_json() {
    let fks = sale_schema();
    let domain = domain::from_json(&json!([
        "|",
        ["partner_id.country_id.code", "=", "ES"],
        ["partner_id.parent_id.name", "ilike", "%acme%"],
        ["state", "not in", ["draft", "cancel"]]
    ]))
    .unwrap();

    let compiled = SqlCompiler::new("sale_order", &fks).compile(&domain).unwrap();
    let keys: Vec<_> = compiled.joins.iter().map(|j| j.key.as_str()).collect();
    assert_eq!(keys, vec!["partner_id", "partner_id.parent_id", "partner_id.country_id"]);

    let sql = SqlCompiler::new("sale_order", &fks).to_sql(&domain).unwrap();
    assert!(sql.contains(r#"INNER JOIN "res_partner" AS "t1" ON "t0"."partner_id" = "t1"."id""#), "{sql}");
    assert!(sql.contains(r#"INNER JOIN "res_partner" AS "t2" ON "t1"."parent_id" = "t2"."id""#), "{sql}");
    assert!(sql.contains(r#"INNER JOIN "res_country" AS "t3" ON "t1"."country_id" = "t3"."id""#), "{sql}");
    assert!(sql.contains(r#""t3"."code" = 'ES' OR "#), "{sql}");
    assert!(sql.contains(r#""t2"."name" ILIKE '%acme%'"#), "{sql}");
    assert!(sql.contains(r#""t0"."state" NOT IN ('draft', 'cancel')"#), "{sql}");
}

#[test]
fn right_hand_field_and_function() {
    let fks = sale_schema();
    let domain = domain::from_json(&json!([
        ["amount", ">", {"field": "partner_id.credit_limit"}],
        ["date", "<", {"function": "coalesce", "args": ["validity_date", "date_order"]}]
    ]))
    .unwrap();

    let sql = SqlCompiler::new("sale_order", &fks).to_sql(&domain).unwrap();
    assert!(sql.contains(r#""t0"."amount" > "t1"."credit_limit""#), "{sql}");
    assert!(sql.contains(r#""t0"."date" < COALESCE("t0"."validity_date", "t0"."date_order")"#), "{sql}");
}

#[test]
fn seeded_join_is_used_lazily() {
    let fks = sale_schema();
    let compiler = SqlCompiler::new("sale_order", &fks);
    let mut session = compiler.session();
    session
        .seed_join("invoice", CustomJoin::new("account_move", JoinKind::Left, "id", "sale_id"))
        .unwrap();
    assert!(session.joins().is_empty());

    let domain = domain::from_json(&json!([["invoice.state", "=", "posted"]])).unwrap();
    ooquery::sql_compiler::compile_in(&mut session, &domain).unwrap();

    let join = &session.joins()[0];
    assert_eq!(join.right.name, "account_move");
    assert_eq!(join.kind, JoinKind::Left);
}

#[test]
fn select_with_filter_in_every_dialect() {
    let fks = sale_schema();
    let domain = domain::from_json(&json!([["partner_id.name", "=", "ACME"]])).unwrap();

    for (dialect, quote) in [(Dialect::Postgres, '"'), (Dialect::Mysql, '`'), (Dialect::Sqlite, '"')] {
        let mut q = OOQuery::new("sale_order", &fks);
        q.select(["name", "partner_id.name"], SelectOptions::default()).unwrap();
        let sql = q.to_sql(&domain, dialect).unwrap();

        let alias = format!("{quote}partner_id_name{quote}");
        assert!(sql.contains(&alias), "{sql}");
        assert_eq!(sql.matches("JOIN").count(), 1, "{sql}");
    }
}

const OPERATORS: [&str; 12] = [
    "=", "!=", "<", "<=", ">", ">=", "like", "not like", "ilike", "not ilike", "in", "not in",
];
const JOIN_CODES: [&str; 8] = ["I", "L", "LO", "R", "RO", "F", "FO", "C"];

#[test]
fn every_operator_and_join_kind_in_every_dialect() {
    let fks = sale_schema();

    for dialect in [Dialect::Postgres, Dialect::Mysql, Dialect::Sqlite] {
        for code in JOIN_CODES {
            let kind = JoinKind::from_code(code).unwrap();
            for op in OPERATORS {
                CompareOp::from_token(op).unwrap();
                let value = if op.ends_with("in") { json!(["a", "b"]) } else { json!("a%") };
                let field = format!("partner_id({code}).name");
                let domain = domain::from_json(&json!([[field, op, value]])).unwrap();

                let compiled = SqlCompiler::new("sale_order", &fks)
                    .with_dialect(dialect)
                    .to_sql(&domain);
                let mut q = OOQuery::new("sale_order", &fks);
                q.select(["name"], SelectOptions::default()).unwrap();
                let selected = q.to_sql(&domain, dialect);

                for result in [compiled, selected] {
                    if !dialect.supports_join(kind) {
                        assert_eq!(result, Err(Error::UnsupportedJoin { kind, dialect }));
                        continue;
                    }
                    let sql = result.unwrap_or_else(|e| panic!("{op} over {code} in {dialect:?}: {e}"));
                    assert_eq!(sql.matches("JOIN").count(), 1, "{sql}");
                    if dialect != Dialect::Postgres {
                        assert!(!sql.contains("ILIKE"), "{sql}");
                    }
                }
            }
        }
    }

    assert!(!Dialect::Mysql.supports_join(JoinKind::Full));
    assert!(!Dialect::Mysql.supports_join(JoinKind::FullOuter));
}

#[test]
fn unresolved_relation_yields_nothing() {
    let fks = sale_schema();
    let domain = domain::from_json(&json!([["company_id.name", "=", "x"]])).unwrap();
    let err = SqlCompiler::new("sale_order", &fks).compile(&domain).unwrap_err();
    assert_eq!(err.to_string(), "no relation `company_id` on table `sale_order`");
}
