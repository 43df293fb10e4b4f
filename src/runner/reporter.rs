use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, Table};

use crate::assertion::AssertionResult;
use crate::result::{CallChainResult, CallResult, ExecutionResult, Outcome, format_date};
use crate::runner::types::{ExecutionSchedule, ExecutionSummary};

pub struct ExecutionReporter {
    verbose: bool,
}

impl ExecutionReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// 打印执行开始
    pub fn print_header(&self, schedule: &ExecutionSchedule, source: &str) {
        let calls: usize = schedule.call_chains.iter().map(|chain| chain.calls.len()).sum();
        println!(
            "\nRunning {} calls in {} chains from {}...\n",
            calls,
            schedule.call_chains.len(),
            source.bold()
        );
    }

    /// 打印全部调用链结果
    pub fn print_result(&self, result: &ExecutionResult) {
        for chain in result.call_chain_results.values() {
            self.print_chain(chain);
        }
    }

    pub fn print_chain(&self, chain: &CallChainResult) {
        let symbol = if chain.is_successful() { "✓".green() } else { "✗".red() };
        println!(" {} {} ({}ms)", symbol, chain.key.bold(), chain.duration());

        for call in chain.call_results.values() {
            self.print_call(call);
        }

        if let Some(assertions) = &chain.assertion_results {
            if !assertions.is_empty() {
                println!("   Chain assertions:");
                for assertion in assertions {
                    print_assertion(assertion.succeeded, &assertion.expression, assertion_detail(assertion));
                }
            }
        }
        println!();
    }

    fn print_call(&self, call: &CallResult) {
        let successful = call.is_successful();
        let symbol = if successful { "✓".green() } else { "✗".red() };

        let (method, uri) = call
            .request
            .as_ref()
            .map(|r| (r.method.to_string(), r.uri.clone()))
            .unwrap_or_else(|| {
                let mode = if call.script_mode { "SCRIPT" } else { "-" };
                (mode.to_string(), String::new())
            });

        let status = match &call.response {
            Some(response) if response.failed => "failed".red().to_string(),
            Some(response) if response.status > 0 => response.status.to_string(),
            _ => String::new(),
        };

        println!(
            "   {} [{}] {} {} {} ({}ms)",
            symbol,
            call.key,
            method.cyan(),
            uri,
            status,
            call.duration()
        );

        if let Some(error) = &call.error {
            println!("     {}: {}", "Error".red().bold(), error);
        }

        if let Some(message) = call
            .response
            .as_ref()
            .filter(|r| r.failed)
            .and_then(|r| r.error_message.as_deref())
        {
            println!("     {}: {}", "Transport".red().bold(), message);
        }

        if self.verbose || !successful {
            if let Some(text) = call.response.as_ref().and_then(|r| r.text()) {
                for line in text.lines().take(20) {
                    println!("     {}", line.dimmed());
                }
            }
        }

        for assertion in call.assertion_results.iter().flatten() {
            if self.verbose || !assertion.succeeded {
                print_assertion(assertion.succeeded, &assertion.expression, assertion_detail(assertion));
            }
        }
    }

    /// 打印摘要和每个调用链的断言统计表
    pub fn print_summary(&self, result: &ExecutionResult) {
        let summary = ExecutionSummary::from_result(result);

        println!("{}", summary_table(result));

        println!("\n{}", "━".repeat(50));
        println!("{}", "Summary".bold());
        println!("{}", "━".repeat(50));

        if summary.failed_calls() == 0 {
            println!(
                "  {}: {} passed, {} total",
                "Calls".bold(),
                summary.passed_calls.to_string().green(),
                summary.calls
            );
        } else {
            println!(
                "  {}: {} passed, {} failed, {} total",
                "Calls".bold(),
                summary.passed_calls.to_string().green(),
                summary.failed_calls().to_string().red(),
                summary.calls
            );
        }

        if summary.total_assertions > 0 {
            println!(
                "  {}: {} passed, {} failed ({} errors), {} total",
                "Assertions".bold(),
                summary.passed_assertions.to_string().green(),
                summary.failed_assertions.to_string().red(),
                summary.error_assertions,
                summary.total_assertions
            );
        }

        println!(
            "  {}: {} → {} ({}ms)",
            "Time".bold(),
            format_date(result.start_date),
            format_date(result.end_date),
            summary.duration
        );
        println!();
    }
}

impl Default for ExecutionReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

fn print_assertion(succeeded: bool, expression: &str, detail: Option<&str>) {
    if succeeded {
        println!("     {} {}", "✓".green(), expression);
    } else {
        println!("     {} {}", "✗".red(), expression);
        if let Some(detail) = detail {
            println!("       {}", detail.red());
        }
    }
}

fn assertion_detail(assertion: &AssertionResult) -> Option<&str> {
    assertion
        .expectation_message
        .as_deref()
        .or(assertion.error_message.as_deref())
}

/// 每个调用链一行：调用数、断言通过/失败、耗时
pub fn summary_table(result: &ExecutionResult) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Chain", "Calls", "Passed", "Failed", "Assertions", "Duration"]);

    for chain in result.call_chain_results.values() {
        let calls = chain.call_results.len();
        let passed = chain
            .call_results
            .values()
            .filter(|call| call.is_successful())
            .count();
        let assertions = chain
            .call_results
            .values()
            .flat_map(|call| call.assertion_results.iter().flatten())
            .chain(chain.assertion_results.iter().flatten());
        let (total, ok) = assertions.fold((0, 0), |(total, ok), a| (total + 1, ok + usize::from(a.succeeded)));

        let color = if chain.is_successful() { Color::Green } else { Color::Red };

        table.add_row(vec![
            Cell::new(&chain.key).fg(color),
            Cell::new(calls),
            Cell::new(passed).fg(Color::Green),
            Cell::new(calls - passed).fg(if calls == passed { Color::Reset } else { Color::Red }),
            Cell::new(format!("{}/{}", ok, total)),
            Cell::new(format!("{}ms", chain.duration())).add_attribute(Attribute::Dim),
        ]);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_table_rows() {
        let mut chain = CallChainResult::new("login-flow");
        chain.succeeded = true;
        chain.record(CallResult {
            executed: true,
            assertion_results: Some(vec![AssertionResult {
                succeeded: true,
                ..AssertionResult::default()
            }]),
            ..CallResult::new("a")
        });
        chain.record(CallResult::unresolved("b", "bad"));

        let mut result = ExecutionResult::new("run");
        result.record(chain);

        let rendered = summary_table(&result).to_string();
        assert!(rendered.contains("login-flow"));
        assert!(rendered.contains("1/1"));
        assert!(rendered.contains("Chain"));
    }
}
