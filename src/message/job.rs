//! Job metadata correlating a request with its response.

/// Sentinel meaning "no job".
pub const JOB_NONE: i64 = -1;

/// Correlation info stamped into an outgoing header. Source job ids are
/// minted by the client's job handler; the target job id, name, and realm
/// address the remote handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub source_job_id: i64,
    pub target_job_id: i64,
    pub job_name: Option<String>,
    pub realm: Option<i32>,
}

impl Default for Job {
    fn default() -> Self {
        Self {
            source_job_id: JOB_NONE,
            target_job_id: JOB_NONE,
            job_name: None,
            realm: None,
        }
    }
}

impl Job {
    /// Job addressed at a named remote handler, e.g. a service method.
    pub fn named(job_name: impl Into<String>, realm: Option<i32>) -> Self {
        Self {
            job_name: Some(job_name.into()),
            realm,
            ..Self::default()
        }
    }
}

/// Proto headers carry job ids as optional fixed64; -1 means absent.
pub(crate) fn job_id_to_proto(id: i64) -> Option<u64> {
    (id != JOB_NONE).then_some(id as u64)
}

pub(crate) fn job_id_from_proto(id: Option<u64>) -> i64 {
    id.map(|v| v as i64).unwrap_or(JOB_NONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proto_job_id_conversion() {
        assert_eq!(job_id_to_proto(JOB_NONE), None);
        assert_eq!(job_id_to_proto(7), Some(7));
        assert_eq!(job_id_from_proto(None), JOB_NONE);
        assert_eq!(job_id_from_proto(Some(7)), 7);
        // The proto-side "no job" sentinel maps back to -1 as well.
        assert_eq!(job_id_from_proto(Some(u64::MAX)), JOB_NONE);
    }
}
