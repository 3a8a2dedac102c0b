//! Domain 的语法分析器（前缀表示法栈机）
//!
//! ## 解析流程图
//!
//! ```text
//! parse_with(bind)
//!   └─ 从数组末尾向开头逐个读取元素
//!        ├─ 条件三元组 (field, op, value)
//!        │    └─ bind(条件) → 压入 Leaf
//!        │
//!        ├─ 运算符标记 "&" / "|" / "!"
//!        │    ├─ 在运算符表中查找元数 n
//!        │    ├─ 弹出 n 个操作数（栈顶即最左侧操作数）
//!        │    ├─ 同类子节点展开合并（And 内不含 And，Or 内不含 Or）
//!        │    └─ 压入新节点
//!        │
//!        └─ 其他 → InvalidExpression
//!
//!   读取完毕后：栈中剩余元素按原始顺序用隐式 And 组合
//! ```
//!
//! ## 示例
//!
//! ```text
//! [('a','=',1)]                       → And[a=1]
//! ['|', ('a','=',1), ('b','=',2)]     → And[Or[a=1, b=2]]
//! [('x','=',2), '|', ('a','=',1), ('b','=',2)]
//!                                     → And[x=2, Or[a=1, b=2]]
//! ['|','|', a, b, c]                  → And[Or[a, b, c]]
//! ```

use crate::ast::{BoolExpr, Condition, DomainItem};
use crate::error::{Error, Result};
use crate::operators::{BoolOp, CompareOp};

pub struct Parser<'a> {
    items: &'a [DomainItem],
}

impl<'a> Parser<'a> {
    /// 借用调用方的 domain；解析过程不会修改输入
    pub fn new(items: &'a [DomainItem]) -> Self {
        Self { items }
    }

    /// 解析为以原始条件为叶子的布尔树，同时校验每个比较运算符
    pub fn parse(&self) -> Result<BoolExpr<Condition>> {
        self.parse_with(|condition| {
            CompareOp::from_token(&condition.operator)?;
            Ok(condition.clone())
        })
    }

    /// 栈机主循环
    ///
    /// `bind` 在遇到每个条件时被调用（从右向左），其结果成为叶子节点。
    /// 编译器借此在解析过程中解析关联字段并登记 join。
    pub fn parse_with<T>(
        &self,
        mut bind: impl FnMut(&Condition) -> Result<T>,
    ) -> Result<BoolExpr<T>> {
        let mut stack: Vec<BoolExpr<T>> = Vec::with_capacity(self.items.len());

        for (position, item) in self.items.iter().enumerate().rev() {
            match item {
                DomainItem::Condition(condition) => {
                    tracing::trace!(position, field = %condition.field, "push condition");
                    stack.push(BoolExpr::Leaf(bind(condition)?));
                }
                DomainItem::Operator(marker) => {
                    let op = BoolOp::from_marker(marker).ok_or_else(|| {
                        Error::invalid_expression(format!(
                            "unknown operator `{marker}` at position {position}"
                        ))
                    })?;
                    let node = Self::reduce(&mut stack, op, position)?;
                    tracing::trace!(position, marker = %marker, "reduce operator");
                    stack.push(node);
                }
            }
        }

        // 栈底是最右侧的元素，恢复原始顺序后用隐式 And 组合
        stack.reverse();
        Ok(BoolExpr::and(stack))
    }

    /// 弹出运算符所需的操作数并构造节点
    fn reduce<T>(stack: &mut Vec<BoolExpr<T>>, op: BoolOp, position: usize) -> Result<BoolExpr<T>> {
        let arity = op.arity();
        let Some(split) = stack.len().checked_sub(arity) else {
            return Err(Error::invalid_expression(format!(
                "operator `{}` at position {position} needs {arity} operands, found {}",
                op.marker(),
                stack.len()
            )));
        };

        let mut operands = stack.split_off(split);
        // 栈顶是最左侧的操作数
        operands.reverse();

        Ok(match op {
            BoolOp::And => BoolExpr::and(operands),
            BoolOp::Or => BoolExpr::or(operands),
            BoolOp::Not => match operands.pop() {
                Some(inner) => BoolExpr::not(inner),
                None => {
                    return Err(Error::invalid_expression(format!(
                        "operator `!` at position {position} has no operand"
                    )));
                }
            },
        })
    }
}

/// 便捷入口：`Parser::new(domain).parse()`
pub fn parse(domain: &[DomainItem]) -> Result<BoolExpr<Condition>> {
    Parser::new(domain).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Condition;

    fn leaf(field: &str, value: i64) -> BoolExpr<Condition> {
        BoolExpr::Leaf(Condition::new(field, "=", value))
    }

    fn cond(field: &str, value: i64) -> DomainItem {
        DomainItem::cond(field, "=", value)
    }

    #[test]
    fn test_simple_notation() {
        let domain = vec![DomainItem::cond("a", "=", "b")];
        let parsed = parse(&domain).unwrap();
        assert_eq!(
            parsed,
            BoolExpr::And(vec![BoolExpr::Leaf(Condition::new("a", "=", "b"))])
        );
    }

    #[test]
    fn test_and_is_default_operator() {
        let parsed = parse(&[cond("a", 1), cond("b", 2)]).unwrap();
        assert_eq!(parsed, BoolExpr::And(vec![leaf("a", 1), leaf("b", 2)]));
    }

    #[test]
    fn test_or_of_two_conditions() {
        let parsed = parse(&[DomainItem::or(), cond("a", 1), cond("b", 2)]).unwrap();
        assert_eq!(
            parsed,
            BoolExpr::And(vec![BoolExpr::Or(vec![leaf("a", 1), leaf("b", 2)])])
        );
    }

    #[test]
    fn test_mixing_and_or() {
        let parsed = parse(&[cond("x", 2), DomainItem::or(), cond("a", 1), cond("b", 2)]).unwrap();
        assert_eq!(
            parsed,
            BoolExpr::And(vec![
                leaf("x", 2),
                BoolExpr::Or(vec![leaf("a", 1), leaf("b", 2)])
            ])
        );
    }

    #[test]
    fn test_nested_or_is_flattened() {
        let parsed = parse(&[
            DomainItem::or(),
            cond("x", 2),
            DomainItem::or(),
            cond("a", 1),
            cond("b", 2),
        ])
        .unwrap();
        assert_eq!(
            parsed,
            BoolExpr::And(vec![BoolExpr::Or(vec![
                leaf("x", 2),
                leaf("a", 1),
                leaf("b", 2)
            ])])
        );
        assert!(parsed.is_flat());
    }

    #[test]
    fn test_leading_or_markers_are_flattened() {
        let parsed = parse(&[
            DomainItem::or(),
            DomainItem::or(),
            cond("s", 1),
            cond("s", 2),
            cond("s", 3),
        ])
        .unwrap();
        assert_eq!(
            parsed,
            BoolExpr::And(vec![BoolExpr::Or(vec![
                leaf("s", 1),
                leaf("s", 2),
                leaf("s", 3)
            ])])
        );
    }

    #[test]
    fn test_explicit_and_merges_into_root() {
        let parsed = parse(&[DomainItem::and(), cond("a", 1), cond("b", 2)]).unwrap();
        assert_eq!(parsed, BoolExpr::And(vec![leaf("a", 1), leaf("b", 2)]));
    }

    #[test]
    fn test_and_inside_or_is_preserved() {
        let parsed = parse(&[
            DomainItem::or(),
            DomainItem::and(),
            cond("a", 1),
            cond("b", 2),
            cond("c", 3),
        ])
        .unwrap();
        assert_eq!(
            parsed,
            BoolExpr::And(vec![BoolExpr::Or(vec![
                BoolExpr::And(vec![leaf("a", 1), leaf("b", 2)]),
                leaf("c", 3)
            ])])
        );
    }

    #[test]
    fn test_not_takes_one_operand() {
        let parsed = parse(&[DomainItem::not(), cond("a", 1), cond("b", 2)]).unwrap();
        assert_eq!(
            parsed,
            BoolExpr::And(vec![BoolExpr::not(leaf("a", 1)), leaf("b", 2)])
        );
    }

    #[test]
    fn test_empty_domain_matches_all() {
        assert_eq!(parse(&[]).unwrap(), BoolExpr::And(vec![]));
    }

    #[test]
    fn test_missing_operands() {
        let err = parse(&[DomainItem::or(), cond("a", 1)]).unwrap_err();
        assert!(matches!(err, Error::InvalidExpression(_)));
    }

    #[test]
    fn test_unknown_marker() {
        let err = parse(&[DomainItem::Operator("^".into()), cond("a", 1), cond("b", 1)]).unwrap_err();
        assert!(matches!(err, Error::InvalidExpression(ref m) if m.contains('^')));
    }

    #[test]
    fn test_unsupported_operator() {
        let err = parse(&[DomainItem::cond("a", "!!=", "b")]).unwrap_err();
        assert_eq!(err, Error::UnsupportedOperator("!!=".to_string()));
    }

    #[test]
    fn test_bind_runs_right_to_left() {
        let domain = [cond("a", 1), DomainItem::or(), cond("b", 2), cond("c", 3)];
        let mut order = Vec::new();
        let parsed = Parser::new(&domain)
            .parse_with(|c| {
                order.push(c.field.clone());
                Ok(c.field.len())
            })
            .unwrap();

        assert_eq!(order, vec!["c", "b", "a"]);
        assert_eq!(parsed.leaves().len(), 3);
    }

    #[test]
    fn test_input_is_left_untouched() {
        let domain = vec![DomainItem::or(), cond("a", 1), cond("b", 2)];
        let before = domain.clone();
        let first = parse(&domain).unwrap();
        let second = parse(&domain).unwrap();
        assert_eq!(domain, before);
        assert_eq!(first, second);
    }
}
