use anyhow::{anyhow, bail, Context};
use ooquery::config::{CompilerConfig, ForeignKeyConfig};
use ooquery::{domain, from_tree, to_tree, Dialect, ForeignKey, RuleTree, SqlCompiler};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

const FOREIGN_KEYS_FILE: &str = "foreign_keys.json";
const COMPILER_CONFIG_FILE: &str = "ooquery.json";
const PROMPT: &str = "ooquery> ";

struct Repl {
    foreign_keys: ForeignKeyConfig,
    config: CompilerConfig,
}

impl Repl {
    /// 加载配置文件，失败时使用默认配置
    fn load() -> Self {
        let foreign_keys = match ForeignKeyConfig::from_json_file(FOREIGN_KEYS_FILE) {
            Ok(config) => {
                println!("✅ 成功从 {} 加载了 {} 个外键", FOREIGN_KEYS_FILE, config.len());
                config
            }
            Err(e) => {
                println!("⚠️ 无法加载外键配置 ({}), 不使用任何关联", e);
                ForeignKeyConfig::default()
            }
        };

        let config = match CompilerConfig::from_json_file(COMPILER_CONFIG_FILE) {
            Ok(config) => {
                println!("✅ 使用编译器配置: {}", COMPILER_CONFIG_FILE);
                config
            }
            Err(e) => {
                println!("⚠️ 无法加载编译器配置 ({}), 使用默认配置", e);
                CompilerConfig::default()
            }
        };

        Self {
            foreign_keys,
            config,
        }
    }

    /// 处理一行输入；返回 `None` 表示退出
    fn handle(&mut self, line: &str) -> Option<anyhow::Result<String>> {
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        Some(match command {
            ":quit" | ":q" => return None,
            ":help" => Ok(HELP.trim().to_string()),
            ":table" => self.set_table(rest),
            ":dialect" => self.set_dialect(rest),
            ":fk" => self.add_foreign_key(rest),
            ":tree" => self.tree(rest),
            ":from-tree" => self.from_tree(rest),
            _ if command.starts_with(':') => Err(anyhow!("未知命令 {command}，输入 :help 查看帮助")),
            _ => self.compile(line),
        })
    }

    fn compile(&self, input: &str) -> anyhow::Result<String> {
        let domain = domain::from_json_str(input)?;
        let compiled = SqlCompiler::new(self.config.root_table.clone(), &self.foreign_keys).compile(&domain)?;
        let sql = compiled.to_sql(self.config.dialect)?;

        let mut out = String::new();
        if !compiled.joins.is_empty() {
            out.push_str("[关联]:\n");
            for join in &compiled.joins {
                out.push_str(&format!(
                    "  {} -> {} AS {} ({:?})\n",
                    join.key, join.right.name, join.right.alias, join.kind
                ));
            }
        }
        out.push_str("[生成的 SQL]:\n");
        out.push_str(&sql);
        Ok(out)
    }

    fn tree(&self, input: &str) -> anyhow::Result<String> {
        let domain = domain::from_json_str(input)?;
        let tree = to_tree(&domain)?;
        Ok(serde_json::to_string_pretty(&tree)?)
    }

    fn from_tree(&self, input: &str) -> anyhow::Result<String> {
        let tree = RuleTree::from_json_str(input)?;
        Ok(domain::to_json(&from_tree(&tree)).to_string())
    }

    fn set_table(&mut self, name: &str) -> anyhow::Result<String> {
        if name.is_empty() {
            return Ok(format!("当前根表: {}", self.config.root_table));
        }
        self.config.root_table = name.to_string();
        Ok(format!("根表已设置为 {name}"))
    }

    fn set_dialect(&mut self, name: &str) -> anyhow::Result<String> {
        let dialect: Dialect = serde_json::from_value(serde_json::Value::String(name.to_lowercase()))
            .with_context(|| format!("未知方言 `{name}`，可选 postgres / mysql / sqlite"))?;
        self.config.dialect = dialect;
        Ok(format!("方言已设置为 {dialect:?}"))
    }

    /// `:fk <表> <字段> <目标表> [目标列]`
    fn add_foreign_key(&mut self, args: &str) -> anyhow::Result<String> {
        let parts: Vec<&str> = args.split_whitespace().collect();
        let (table, field, target, column) = match parts.as_slice() {
            [table, field, target] => (*table, *field, *target, "id"),
            [table, field, target, column] => (*table, *field, *target, *column),
            _ => bail!("用法: :fk <表> <字段> <目标表> [目标列]"),
        };
        self.foreign_keys
            .insert(table, field, ForeignKey::new(target, field, column));
        Ok(format!("{table}.{field} -> {target}.{column}"))
    }
}

const HELP: &str = r#"
输入 JSON 格式的 domain 编译为 SQL，例如:
  ["|", ["state", "=", "open"], ["partner_id.name", "ilike", "jo%"]]

命令:
  :tree <domain>        domain 转换为规则树
  :from-tree <tree>     规则树转换为 domain
  :table [名称]         查看或设置根表
  :dialect <名称>       postgres / mysql / sqlite
  :fk <表> <字段> <目标表> [目标列]
  :help                 显示帮助
  :quit                 退出
"#;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    println!("--- ooquery: Domain 到 SQL 编译器 ---");
    println!("\n[配置信息]:");
    let mut repl = Repl::load();
    println!(
        "根表: {}，方言: {:?}\n输入 :help 查看帮助\n",
        repl.config.root_table, repl.config.dialect
    );

    let mut editor = DefaultEditor::new().context("无法初始化行编辑器")?;
    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                match repl.handle(line) {
                    None => break,
                    Some(Ok(output)) => println!("{output}"),
                    Some(Err(e)) => println!("✗ {e:#}"),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repl(dialect: Dialect) -> Repl {
        let mut foreign_keys = ForeignKeyConfig::default();
        foreign_keys.insert("sale_order", "partner_id", ForeignKey::new("res_partner", "partner_id", "id"));
        Repl {
            foreign_keys,
            config: CompilerConfig {
                dialect,
                root_table: "sale_order".to_string(),
            },
        }
    }

    #[test]
    fn test_compile_lists_joins_and_sql() {
        let out = repl(Dialect::Mysql)
            .compile(r#"[["partner_id.name", "ilike", "jo%"]]"#)
            .unwrap();
        assert!(out.contains("partner_id -> res_partner AS t1 (Inner)"), "{out}");
        assert!(out.contains("LOWER(`t1`.`name`) LIKE LOWER('jo%')"), "{out}");
    }

    #[test]
    fn test_compile_reports_unsupported_join() {
        let err = repl(Dialect::Mysql)
            .compile(r#"[["partner_id(F).name", "=", "x"]]"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "join `F` is not supported by mysql");
    }
}
