use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use polyjudge::{
    Config, Dispatcher, ExecutionRequest, ExecutionResult, ExecutionStatus, Language,
    ResourceLimits, RuntimeAdapter,
};
use pretty_assertions::assert_eq;

use super::{CAT_SOURCE, question, write_module};

const TWO_SUM: &str = r#"
var twoSum = (nums, target) => {
    const seen = new Map();
    for (let i = 0; i < nums.length; i++) {
        if (seen.has(target - nums[i])) return [seen.get(target - nums[i]), i];
        seen.set(nums[i], i);
    }
    return [];
};
"#;

fn dispatcher() -> Dispatcher {
    Dispatcher::from_config(&Config::empty()).expect("Failed to build dispatcher")
}

struct CountingAdapter {
    language: Language,
    calls: AtomicUsize,
}

#[async_trait]
impl RuntimeAdapter for CountingAdapter {
    fn language(&self) -> Language {
        self.language
    }

    async fn execute(&self, _request: ExecutionRequest<'_>) -> ExecutionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ExecutionResult::free_form(String::new(), Duration::ZERO)
    }
}

#[tokio::test]
async fn test_javascript_accepted() {
    let q = question(&[("nums = [2,7,11,15], target = 9", "[0,1]")], None);
    let result = dispatcher().execute_code("javascript", TWO_SUM, &q).await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
    let cases = result.test_case_results.expect("graded run has case results");
    assert_eq!(cases.len(), 1);
    assert!(cases[0].passed);
    assert_eq!(cases[0].actual_output, "[0,1]");
}

#[tokio::test]
async fn test_javascript_wrong_answer() {
    let code = "var twoSum = (nums, target) => [1, 0];";
    let q = question(&[("nums = [2,7,11,15], target = 9", "[0,1]")], None);
    let result = dispatcher().execute_code("javascript", code, &q).await;

    assert_eq!(result.status, ExecutionStatus::WrongAnswer);
    let cases = result.test_case_results.expect("graded run has case results");
    assert!(!cases[0].passed);
    assert_eq!(cases[0].actual_output, "[1,0]");
}

#[tokio::test]
async fn test_empty_code_never_reaches_the_adapter() {
    let adapter = Arc::new(CountingAdapter {
        language: Language::Python,
        calls: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::new().with_adapter(adapter.clone());

    let result = dispatcher
        .execute_code("python", "", &question(&[("1", "1")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert_eq!(result.execution_time, 0.0);
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cpp_fragment_gets_wrapper_main() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = Config::empty();
    config.cpp.interpreter = write_module(dir.path(), "cat.wat", CAT_SOURCE);

    let dispatcher = Dispatcher::from_config(&config).expect("Failed to build dispatcher");
    let code = "int add(int a, int b) { return a + b; }";
    let result = dispatcher.execute_code("cpp", code, &question(&[], None)).await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
    assert!(result.output.contains("int add(int a, int b)"));
    assert!(result.output.contains("No main() function found"));
}

#[tokio::test]
async fn test_runaway_code_hits_time_limit() {
    let mut config = Config::empty();
    config.javascript.limits = Some(ResourceLimits::unset().with_timeout_ms(200));

    let dispatcher = Dispatcher::from_config(&config).expect("Failed to build dispatcher");
    let code = "function solve(n) { while (true) {} }";
    let result = dispatcher
        .execute_code("javascript", code, &question(&[("1", "1")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::TimeLimitExceeded);
    assert_eq!(result.execution_time, 200.0);
}

#[tokio::test]
async fn test_deterministic_code_is_idempotent() {
    let dispatcher = dispatcher();
    let q = question(
        &[
            ("nums = [2,7,11,15], target = 9", "[0,1]"),
            ("nums = [3,2,4], target = 6", "[1,2]"),
        ],
        None,
    );

    let mut first = dispatcher.execute_code("js", TWO_SUM, &q).await;
    let mut second = dispatcher.execute_code("js", TWO_SUM, &q).await;
    for result in [&mut first, &mut second] {
        result.execution_time = 0.0;
        for case in result.test_case_results.iter_mut().flatten() {
            case.execution_time = 0.0;
        }
    }
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_function_name_hint_is_used() {
    let code = "function helper() { return 0; }\nfunction answer(n) { return n * 2; }\nfunction last() {}";
    let q = question(&[("n = 4", "8")], Some("answer"));
    let result = dispatcher().execute_code("javascript", code, &q).await;
    assert_eq!(result.status, ExecutionStatus::Accepted);
}

#[tokio::test]
async fn test_unsupported_language() {
    let result = dispatcher()
        .execute_code("cobol", "DISPLAY 'HI'.", &question(&[], None))
        .await;
    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert!(result.output.contains("javascript, python, cpp, c, java"));
}
