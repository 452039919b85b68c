//! Runs against real interpreter builds placed under `runtimes/` at the
//! workspace root (python.wasm with its stdlib in python-lib, and picoc.wasm).

use std::path::PathBuf;

use polyjudge::{Config, Dispatcher, ExecutionStatus};

use super::question;

fn runtimes_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../runtimes"))
}

fn dispatcher() -> Dispatcher {
    let dir = runtimes_dir();
    let mut config = Config::default();
    config.python.module = dir.join("python.wasm");
    for mount in &mut config.python.mounts {
        mount.source = dir.join("python-lib").to_string_lossy().into_owned();
    }
    config.c.interpreter = dir.join("picoc.wasm");
    config.cpp.interpreter = dir.join("picoc.wasm");
    Dispatcher::from_config(&config).expect("Failed to build dispatcher")
}

#[tokio::test]
#[ignore = "requires python.wasm"]
async fn test_python_two_sum() {
    let code = r#"
class Solution:
    def twoSum(self, nums, target):
        seen = {}
        for i, n in enumerate(nums):
            if target - n in seen:
                return [seen[target - n], i]
            seen[n] = i
"#;
    let q = question(&[("nums = [2,7,11,15], target = 9", "[0,1]")], None);
    let result = dispatcher().execute_code("python", code, &q).await;

    assert_eq!(result.status, ExecutionStatus::Accepted, "{}", result.output);
}

#[tokio::test]
#[ignore = "requires python.wasm"]
async fn test_python_free_form_prints() {
    let result = dispatcher()
        .execute_code("python", "print('hello from wasi')", &question(&[], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::Accepted);
    assert!(result.output.contains("hello from wasi"));
}

#[tokio::test]
#[ignore = "requires python.wasm"]
async fn test_python_syntax_error() {
    let result = dispatcher()
        .execute_code("python", "def broken(:\n    pass", &question(&[("1", "1")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
}

#[tokio::test]
#[ignore = "requires python.wasm"]
async fn test_python_prefers_two_sum_over_earlier_methods() {
    let code = r#"
class Solution:
    def helper(self, nums, target):
        return [-1, -1]

    def twoSum(self, nums, target):
        return [0, 1]
"#;
    let q = question(&[("nums = [2,7,11,15], target = 9", "[0,1]")], None);
    let result = dispatcher().execute_code("python", code, &q).await;

    assert_eq!(result.status, ExecutionStatus::Accepted, "{}", result.output);
}

#[tokio::test]
#[ignore = "requires python.wasm"]
async fn test_python_skips_underscore_methods() {
    let code = r#"
class Solution:
    def _private(self, n):
        return -1

    def solve(self, n):
        return n * 2
"#;
    let q = question(&[("n = 4", "8")], None);
    let result = dispatcher().execute_code("python", code, &q).await;

    assert_eq!(result.status, ExecutionStatus::Accepted, "{}", result.output);
}

#[tokio::test]
#[ignore = "requires python.wasm"]
async fn test_python_missing_solution_class() {
    let code = "def solve(n):\n    return n\n";
    let result = dispatcher()
        .execute_code("python", code, &question(&[("n = 1", "1")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    assert!(
        result.output.contains("Solution class not found"),
        "{}",
        result.output
    );
}

#[tokio::test]
#[ignore = "requires python.wasm"]
async fn test_python_exception_fails_only_its_case() {
    let code = r#"
class Solution:
    def check(self, n):
        if n < 0:
            raise ValueError("negative input")
        return n
"#;
    let q = question(&[("n = -1", "-1"), ("n = 5", "5")], None);
    let result = dispatcher().execute_code("python", code, &q).await;

    assert_eq!(result.status, ExecutionStatus::WrongAnswer);
    let cases = result.test_case_results.expect("graded run");
    assert_eq!(cases.len(), 2);
    assert!(!cases[0].passed);
    assert!(
        cases[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("ValueError: negative input"))
    );
    assert!(cases[1].passed);
    assert_eq!(cases[1].error, None);
}

#[tokio::test]
#[ignore = "requires picoc.wasm"]
async fn test_c_reads_stream_input() {
    let code = r#"
#include <stdio.h>
int main() {
    int n, x, sum = 0;
    scanf("%d", &n);
    for (int i = 0; i < n; i++) { scanf("%d", &x); sum += x; }
    printf("%d\n", sum);
    return 0;
}
"#;
    let result = dispatcher()
        .execute_code("c", code, &question(&[("nums = [1,2,3,4]", "10")], None))
        .await;

    assert_eq!(result.status, ExecutionStatus::Accepted, "{}", result.output);
}

#[tokio::test]
#[ignore = "requires picoc.wasm"]
async fn test_cpp_fragment_prints_instructions() {
    let result = dispatcher()
        .execute_code("cpp", "int add(int a, int b) { return a + b; }", &question(&[], None))
        .await;

    assert!(result.output.contains("No main() function found"));
}
