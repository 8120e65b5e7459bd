#[cfg(test)]
mod tests {
    use crate::log_exceptions;
    use crate::test_support::{json_subscriber, CapturedLogs};
    use std::panic::{self, AssertUnwindSafe};
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq, Eq)]
    enum CheckError {
        #[error("threshold exceeded: {0}%")]
        Threshold(u8),
        #[error("invalid input")]
        Invalid(#[from] std::num::ParseIntError),
    }

    #[log_exceptions]
    fn check_disk(used: u8) -> Result<u8, CheckError> {
        if used > 90 {
            return Err(CheckError::Threshold(used));
        }
        Ok(100 - used)
    }

    #[log_exceptions(name = "checks.parse")]
    fn parse_threshold(raw: &str) -> Result<u8, CheckError> {
        let value: u8 = raw.trim().parse()?;
        Ok(value)
    }

    #[log_exceptions(crate = "crate", name = "checks.memory")]
    fn check_memory(free_mb: u32) -> Result<u32, CheckError> {
        if free_mb < 64 {
            return Err(CheckError::Threshold(99));
        }
        Ok(free_mb)
    }

    #[log_exceptions]
    fn always_panics() -> Result<(), CheckError> {
        panic!("collector crashed")
    }

    #[log_exceptions]
    async fn check_network(reachable: bool) -> Result<&'static str, CheckError> {
        tokio::task::yield_now().await;
        if reachable {
            Ok("up")
        } else {
            Err(CheckError::Threshold(0))
        }
    }

    struct Collector {
        limit: u8,
    }

    impl Collector {
        #[log_exceptions]
        fn check(&self, used: u8) -> Result<(), CheckError> {
            if used > self.limit {
                Err(CheckError::Threshold(used))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_attribute_keeps_success_path_silent() {
        let logs = CapturedLogs::default();

        let free = tracing::subscriber::with_default(json_subscriber(&logs), || check_disk(40));

        assert_eq!(free, Ok(60));
        assert!(logs.lines().is_empty());
    }

    #[test]
    fn test_attribute_logs_under_function_name() {
        let logs = CapturedLogs::default();

        let result = tracing::subscriber::with_default(json_subscriber(&logs), || check_disk(95));

        assert_eq!(result, Err(CheckError::Threshold(95)));
        let errors = logs.error_records();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0]["fields"]["message"],
            "Uncaught exception while running check_disk"
        );
        assert_eq!(errors[0]["fields"]["error"], "threshold exceeded: 95%");
    }

    #[test]
    fn test_attribute_supports_question_mark_and_custom_name() {
        let logs = CapturedLogs::default();

        let (good, bad) = tracing::subscriber::with_default(json_subscriber(&logs), || {
            (parse_threshold(" 80 "), parse_threshold("eighty"))
        });

        assert_eq!(good, Ok(80));
        assert!(matches!(bad, Err(CheckError::Invalid(_))));
        let errors = logs.error_records();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["fields"]["function"], "checks.parse");
    }

    #[test]
    fn test_attribute_with_crate_path() {
        let logs = CapturedLogs::default();

        let (ok, err) = tracing::subscriber::with_default(json_subscriber(&logs), || {
            (check_memory(512), check_memory(32))
        });

        assert_eq!(ok, Ok(512));
        assert_eq!(err, Err(CheckError::Threshold(99)));
        let errors = logs.error_records();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["fields"]["function"], "checks.memory");
    }

    #[test]
    fn test_attribute_on_methods() {
        let logs = CapturedLogs::default();
        let collector = Collector { limit: 50 };

        tracing::subscriber::with_default(json_subscriber(&logs), || {
            assert!(collector.check(10).is_ok());
            assert!(collector.check(70).is_err());
        });

        assert_eq!(logs.error_records()[0]["fields"]["function"], "check");
    }

    #[test]
    fn test_attribute_resumes_panics() {
        let logs = CapturedLogs::default();

        let outcome = tracing::subscriber::with_default(json_subscriber(&logs), || {
            panic::catch_unwind(AssertUnwindSafe(always_panics))
        });

        assert!(outcome.is_err());
        let errors = logs.error_records();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["fields"]["function"], "always_panics");
        assert_eq!(errors[0]["fields"]["error"], "collector crashed");
    }

    #[tokio::test]
    async fn test_attribute_on_async_functions() {
        let logs = CapturedLogs::default();
        let _guard = tracing::subscriber::set_default(json_subscriber(&logs));

        assert_eq!(check_network(true).await, Ok("up"));
        assert_eq!(check_network(false).await, Err(CheckError::Threshold(0)));

        let errors = logs.error_records();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["fields"]["function"], "check_network");
    }
}
