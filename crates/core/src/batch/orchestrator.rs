//! The batch state machine.

use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::BatchConfig;
use super::confirm::ConfirmationGate;
use super::error::BatchError;
use super::filter::ItemFilter;
use super::ledger::{unique_log_name, ErrorLedger};
use super::types::{
    AbortReason, BatchEvent, BatchJob, BatchState, BatchSummary, ItemStatus, ProgressState,
    RunContext,
};
use crate::archive::{
    is_valid_entry_name, ArchiveConfig, ArchiveEncoder, MAX_ENTRY_BYTES, MAX_ENTRY_NAME_BYTES,
};
use crate::metrics;
use crate::sink::{ArchiveSink, SinkReport};
use crate::source::{ItemDescriptor, ItemSource};
use crate::transformer::{TransformOutcome, Transformer, TransformerGateway};

/// Drives one batch at a time from confirmation to a finished archive.
///
/// Items are processed strictly in source order, one at a time. Successful
/// outputs become archive entries named after the item; failures are
/// collected and written as a final log entry.
pub struct BatchOrchestrator<T: Transformer> {
    config: BatchConfig,
    archive: ArchiveConfig,
    gateway: TransformerGateway<T>,
    filter: ItemFilter,
}

/// Mutable bookkeeping for a single run.
struct RunState {
    batch_id: String,
    state: BatchState,
    progress: ProgressState,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    bytes_written: u64,
    ledger: ErrorLedger,
    events: Option<mpsc::Sender<BatchEvent>>,
}

impl RunState {
    fn transition(&mut self, next: BatchState) -> Result<(), BatchError> {
        if !self.state.can_transition_to(next) {
            return Err(BatchError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(batch_id = %self.batch_id, from = %self.state, to = %next, "Batch state change");
        self.state = next;
        Ok(())
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(events) = &self.events {
            // Progress consumers must never stall the pipeline.
            if let Err(e) = events.try_send(event) {
                debug!(batch_id = %self.batch_id, error = %e, "Dropped batch event");
            }
        }
    }

    fn record(&mut self, status: ItemStatus) {
        match status {
            ItemStatus::Succeeded => self.succeeded += 1,
            ItemStatus::Failed => self.failed += 1,
            ItemStatus::Skipped => self.skipped += 1,
        }
        self.progress.processed += 1;
        metrics::ITEMS_TOTAL
            .with_label_values(&[status.as_str()])
            .inc();
    }

    fn summary(
        &self,
        started: Instant,
        abort_reason: Option<AbortReason>,
        archive: Option<SinkReport>,
    ) -> BatchSummary {
        BatchSummary {
            batch_id: self.batch_id.clone(),
            total: self.progress.total,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            aborted: abort_reason.is_some(),
            abort_reason,
            bytes_written: self.bytes_written,
            duration_ms: started.elapsed().as_millis() as u64,
            archive,
        }
    }
}

impl<T: Transformer> BatchOrchestrator<T> {
    pub fn new(config: BatchConfig, archive: ArchiveConfig, gateway: TransformerGateway<T>) -> Self {
        let filter = ItemFilter::from_config(&config);
        Self {
            config,
            archive,
            gateway,
            filter,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn archive_config(&self) -> &ArchiveConfig {
        &self.archive
    }

    pub fn gateway(&self) -> &TransformerGateway<T> {
        &self.gateway
    }

    /// Runs a batch to completion or abort.
    ///
    /// The sink is untouched when the gate declines. On every other abort the
    /// sink's `abort` is called and no archive is reported.
    pub async fn run<S, K, G>(
        &self,
        job: &BatchJob,
        source: &S,
        sink: &mut K,
        gate: &G,
        ctx: RunContext,
    ) -> BatchSummary
    where
        S: ItemSource + ?Sized,
        K: ArchiveSink + ?Sized,
        G: ConfirmationGate + ?Sized,
    {
        let started = Instant::now();
        let mut run = RunState {
            batch_id: job.batch_id.clone(),
            state: BatchState::Idle,
            progress: ProgressState::new(source.total_count()),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            bytes_written: 0,
            ledger: ErrorLedger::new(self.config.max_error_message_bytes),
            events: ctx.progress.clone(),
        };

        metrics::BATCHES_IN_PROGRESS.inc();
        let summary = self.execute(job, source, sink, gate, &ctx, &mut run, started).await;
        metrics::BATCHES_IN_PROGRESS.dec();

        let result = match &summary.abort_reason {
            None => "completed",
            Some(AbortReason::Declined) => "declined",
            Some(_) => "aborted",
        };
        metrics::BATCHES_TOTAL.with_label_values(&[result]).inc();
        metrics::BATCH_DURATION_SECONDS
            .with_label_values(&[result])
            .observe(started.elapsed().as_secs_f64());

        run.emit(BatchEvent::Finished {
            summary: summary.clone(),
        });
        summary
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute<S, K, G>(
        &self,
        job: &BatchJob,
        source: &S,
        sink: &mut K,
        gate: &G,
        ctx: &RunContext,
        run: &mut RunState,
        started: Instant,
    ) -> BatchSummary
    where
        S: ItemSource + ?Sized,
        K: ArchiveSink + ?Sized,
        G: ConfirmationGate + ?Sized,
    {
        if let Err(e) = run.transition(BatchState::Confirming) {
            return self.abort(sink, run, started, e).await;
        }
        let preflight = source.preflight();
        run.emit(BatchEvent::Confirming {
            item_count: preflight.item_count,
            total_bytes: preflight.total_bytes,
        });

        if !gate.confirm(&preflight).await {
            info!(
                batch_id = %job.batch_id,
                items = preflight.item_count,
                megabytes = format!("{:.2}", preflight.total_megabytes()),
                "Batch declined"
            );
            run.state = BatchState::Aborted;
            run.emit(BatchEvent::Declined);
            return run.summary(started, Some(AbortReason::Declined), None);
        }

        info!(
            batch_id = %job.batch_id,
            items = preflight.item_count,
            bytes = preflight.total_bytes,
            sink = sink.name(),
            transformer = self.gateway.transformer().name(),
            "Batch started"
        );

        match self.drive(job, source, sink, ctx, run).await {
            Ok(report) => {
                info!(
                    batch_id = %job.batch_id,
                    succeeded = run.succeeded,
                    failed = run.failed,
                    skipped = run.skipped,
                    bytes = report.bytes_written,
                    "Batch completed"
                );
                run.summary(started, None, Some(report))
            }
            Err(e) => self.abort(sink, run, started, e).await,
        }
    }

    async fn abort<K>(
        &self,
        sink: &mut K,
        run: &mut RunState,
        started: Instant,
        cause: BatchError,
    ) -> BatchSummary
    where
        K: ArchiveSink + ?Sized,
    {
        let reason = match &cause {
            BatchError::Cancelled => {
                info!(batch_id = %run.batch_id, processed = run.progress.processed, "Batch cancelled");
                AbortReason::Cancelled
            }
            BatchError::Sink(e) => {
                error!(batch_id = %run.batch_id, error = %e, "Batch aborted by sink failure");
                AbortReason::SinkFailure {
                    message: e.to_string(),
                }
            }
            BatchError::Protocol(_) | BatchError::InvalidTransition { .. } => {
                error!(batch_id = %run.batch_id, error = %cause, "Batch aborted by protocol violation");
                AbortReason::ProtocolViolation {
                    message: cause.to_string(),
                }
            }
        };

        sink.abort(&reason.to_string()).await;
        run.state = BatchState::Aborted;
        run.summary(started, Some(reason), None)
    }

    async fn drive<S, K>(
        &self,
        job: &BatchJob,
        source: &S,
        sink: &mut K,
        ctx: &RunContext,
        run: &mut RunState,
    ) -> Result<SinkReport, BatchError>
    where
        S: ItemSource + ?Sized,
        K: ArchiveSink + ?Sized,
    {
        run.transition(BatchState::Running)?;
        run.emit(BatchEvent::Started {
            total: run.progress.total,
        });

        let mut encoder = ArchiveEncoder::new(self.archive.clone());

        for descriptor in source.descriptors() {
            if ctx.cancel.is_cancelled() {
                return Err(BatchError::Cancelled);
            }

            let status = self
                .process_item(job, source, descriptor, &mut encoder, sink, run)
                .await?;
            run.record(status);
            run.emit(BatchEvent::ItemFinished {
                identifier: descriptor.identifier.clone(),
                status,
                processed: run.progress.processed,
                total: run.progress.total,
            });

            tokio::task::yield_now().await;
        }

        if ctx.cancel.is_cancelled() {
            return Err(BatchError::Cancelled);
        }

        run.transition(BatchState::Finalizing)?;
        run.emit(BatchEvent::Finalizing);

        if !run.ledger.is_empty() {
            let name = unique_log_name(&self.config.error_log_name, |n| encoder.has_entry(n));
            let log = run.ledger.render();
            debug!(batch_id = %job.batch_id, entry = %name, failures = run.ledger.len(), "Writing error log");
            self.append_entry(&mut encoder, sink, run, &name, log.as_bytes())
                .await?;
        }

        encoder.finish()?;
        self.flush(&mut encoder, sink, run).await?;

        let report = sink.close().await?;
        run.transition(BatchState::Done)?;
        Ok(report)
    }

    async fn process_item<S, K>(
        &self,
        job: &BatchJob,
        source: &S,
        descriptor: &ItemDescriptor,
        encoder: &mut ArchiveEncoder,
        sink: &mut K,
        run: &mut RunState,
    ) -> Result<ItemStatus, BatchError>
    where
        S: ItemSource + ?Sized,
        K: ArchiveSink + ?Sized,
    {
        if !self.filter.accepts(descriptor) {
            debug!(identifier = %descriptor.identifier, "Skipping item");
            return Ok(ItemStatus::Skipped);
        }

        let item = match source.load(descriptor).await {
            Ok(item) => item,
            Err(e) => {
                warn!(identifier = %descriptor.identifier, error = %e, "Failed to read item");
                run.ledger.record(&descriptor.identifier, &e.to_string());
                return Ok(ItemStatus::Failed);
            }
        };

        match self.gateway.transform(item, &job.policy).await {
            TransformOutcome::Success { name, bytes } => {
                if !is_valid_entry_name(&name) {
                    let message = format!(
                        "Entry name of {} bytes is empty or exceeds the {} byte name limit",
                        name.len(),
                        MAX_ENTRY_NAME_BYTES
                    );
                    warn!(identifier = %descriptor.identifier, "{}", message);
                    run.ledger.record(&descriptor.identifier, &message);
                    return Ok(ItemStatus::Failed);
                }
                if bytes.len() as u64 > MAX_ENTRY_BYTES {
                    let message = format!(
                        "Transformed output of {} bytes exceeds the {} byte entry limit",
                        bytes.len(),
                        MAX_ENTRY_BYTES
                    );
                    warn!(identifier = %name, "{}", message);
                    run.ledger.record(name, &message);
                    return Ok(ItemStatus::Failed);
                }
                self.append_entry(encoder, sink, run, &name, &bytes).await?;
                Ok(ItemStatus::Succeeded)
            }
            TransformOutcome::Failure { name, message } => {
                run.ledger.record(name, &message);
                Ok(ItemStatus::Failed)
            }
        }
    }

    /// Writes one complete entry, handing chunks to the sink as they fill.
    async fn append_entry<K>(
        &self,
        encoder: &mut ArchiveEncoder,
        sink: &mut K,
        run: &mut RunState,
        name: &str,
        payload: &[u8],
    ) -> Result<(), BatchError>
    where
        K: ArchiveSink + ?Sized,
    {
        let handle = encoder.open(name)?;
        for slice in payload.chunks(self.archive.block_threshold_bytes.max(1)) {
            encoder.push(&handle, slice)?;
            self.flush(encoder, sink, run).await?;
        }
        encoder.close(handle)?;
        self.flush(encoder, sink, run).await
    }

    async fn flush<K>(
        &self,
        encoder: &mut ArchiveEncoder,
        sink: &mut K,
        run: &mut RunState,
    ) -> Result<(), BatchError>
    where
        K: ArchiveSink + ?Sized,
    {
        let chunks: Vec<Vec<u8>> = encoder.take_chunks().collect();
        for chunk in chunks {
            let len = chunk.len() as u64;
            let ack = sink.write(chunk).await?;
            run.bytes_written = ack.bytes_written;
            metrics::ARCHIVE_BYTES_TOTAL.inc_by(len);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{AutoConfirm, LimitGate};
    use crate::source::MemorySource;
    use crate::testing::{read_archive, MemorySink, MockTransformer};
    use crate::transformer::TransformerConfig;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn orchestrator(
        scratch: &TempDir,
        transformer: MockTransformer,
        config: BatchConfig,
    ) -> BatchOrchestrator<MockTransformer> {
        let gateway = TransformerGateway::new(
            transformer,
            TransformerConfig::default().with_scratch_dir(scratch.path()),
        );
        BatchOrchestrator::new(config, ArchiveConfig::default().with_block_threshold(1024), gateway)
    }

    fn job() -> BatchJob {
        BatchJob::new("batch-1", "recipe")
    }

    #[tokio::test]
    async fn test_mixed_outcomes() {
        let scratch = TempDir::new().unwrap();
        let transformer = MockTransformer::new()
            .with_output("A", b"AAA".to_vec())
            .with_error("B", "bad format")
            .with_output("C", Vec::new());
        let orchestrator = orchestrator(&scratch, transformer, BatchConfig::default());

        let source: MemorySource = [("A", b"a".to_vec()), ("B", b"b".to_vec()), ("C", b"c".to_vec())]
            .into_iter()
            .collect();
        let mut sink = MemorySink::new();

        let summary = orchestrator
            .run(&job(), &source, &mut sink, &AutoConfirm, RunContext::new())
            .await;

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.aborted);
        assert_eq!(summary.bytes_written, sink.bytes().len() as u64);

        let entries = read_archive(&sink.bytes());
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["A", "C", "processing_errors.log"]);
        assert_eq!(entries[0].1, b"AAA");
        assert!(entries[1].1.is_empty());
        let log = String::from_utf8(entries[2].1.clone()).unwrap();
        assert_eq!(log, "Error processing B: bad format\n\n");
    }

    #[tokio::test]
    async fn test_overlong_name_is_recorded_as_failure() {
        let scratch = TempDir::new().unwrap();
        let orchestrator = orchestrator(&scratch, MockTransformer::new(), BatchConfig::default());
        let long_name = format!("deep/{}", "x".repeat(70_000));
        let source: MemorySource = [("ok.txt", b"1".to_vec()), (long_name.as_str(), b"2".to_vec())]
            .into_iter()
            .collect();
        let mut sink = MemorySink::new();

        let summary = orchestrator
            .run(&job(), &source, &mut sink, &AutoConfirm, RunContext::new())
            .await;

        assert!(!summary.aborted);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);

        let entries = read_archive(&sink.bytes());
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["ok.txt", "processing_errors.log"]);
        let log = String::from_utf8(entries[1].1.clone()).unwrap();
        assert!(log.starts_with("Error processing deep/xxx"));
        assert!(log.contains("exceeds the 65535 byte name limit"));
    }

    #[tokio::test]
    async fn test_policy_reaches_every_call() {
        let scratch = TempDir::new().unwrap();
        let transformer = MockTransformer::new();
        let orchestrator = orchestrator(&scratch, transformer, BatchConfig::default());
        let source: MemorySource = [("x", b"1".to_vec()), ("y", b"2".to_vec())]
            .into_iter()
            .collect();
        let mut sink = MemorySink::new();

        orchestrator
            .run(&job(), &source, &mut sink, &AutoConfirm, RunContext::new())
            .await;

        let calls = orchestrator.gateway().transformer().recorded_calls().await;
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.policy == "recipe"));
        assert_eq!(calls[0].identifier, "x");
        assert_eq!(calls[1].identifier, "y");
    }

    #[tokio::test]
    async fn test_decline_touches_nothing() {
        let scratch = TempDir::new().unwrap();
        let orchestrator = orchestrator(&scratch, MockTransformer::new(), BatchConfig::default());
        let source: MemorySource = [("x", vec![0u8; 100])].into_iter().collect();
        let mut sink = MemorySink::new();

        let summary = orchestrator
            .run(
                &job(),
                &source,
                &mut sink,
                &LimitGate::new(None, Some(10)),
                RunContext::new(),
            )
            .await;

        assert!(summary.aborted);
        assert_eq!(summary.abort_reason, Some(AbortReason::Declined));
        assert_eq!(summary.succeeded + summary.failed, 0);
        assert_eq!(sink.write_count(), 0);
        assert!(!sink.is_closed());
        assert!(!sink.is_aborted());
        assert!(orchestrator
            .gateway()
            .transformer()
            .recorded_calls()
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_skipped_items_are_not_loaded_or_logged() {
        let scratch = TempDir::new().unwrap();
        let config = BatchConfig::default()
            .with_extensions(["dcm"])
            .with_skip_hidden(true);
        let orchestrator = orchestrator(&scratch, MockTransformer::new(), config);
        let source: MemorySource = [
            ("a.dcm", b"1".to_vec()),
            ("notes.txt", b"2".to_vec()),
            (".hidden/b.dcm", b"3".to_vec()),
        ]
        .into_iter()
        .collect();
        let mut sink = MemorySink::new();

        let summary = orchestrator
            .run(&job(), &source, &mut sink, &AutoConfirm, RunContext::new())
            .await;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.processed(), summary.total);

        let entries = read_archive(&sink.bytes());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "a.dcm");
    }

    #[tokio::test]
    async fn test_error_log_name_is_decollided() {
        let scratch = TempDir::new().unwrap();
        let transformer = MockTransformer::new().with_error("bad.dcm", "invalid");
        let orchestrator = orchestrator(&scratch, transformer, BatchConfig::default());
        let source: MemorySource = [
            ("processing_errors.log", b"user file".to_vec()),
            ("bad.dcm", b"x".to_vec()),
        ]
        .into_iter()
        .collect();
        let mut sink = MemorySink::new();

        orchestrator
            .run(&job(), &source, &mut sink, &AutoConfirm, RunContext::new())
            .await;

        let names: Vec<String> = read_archive(&sink.bytes())
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["processing_errors.log", "processing_errors-1.log"]);
    }

    #[tokio::test]
    async fn test_large_payload_is_streamed_in_blocks() {
        let scratch = TempDir::new().unwrap();
        let orchestrator = orchestrator(&scratch, MockTransformer::new(), BatchConfig::default());
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let source: MemorySource = [("big.bin", payload.clone())].into_iter().collect();
        let mut sink = MemorySink::new();

        orchestrator
            .run(&job(), &source, &mut sink, &AutoConfirm, RunContext::new())
            .await;

        assert!(sink.writes().iter().all(|w| w.len() <= 1024));
        assert!(sink.write_count() >= 10);
        let entries = read_archive(&sink.bytes());
        assert_eq!(entries[0].1, payload);
    }

    #[tokio::test]
    async fn test_cancel_before_start_aborts_sink() {
        let scratch = TempDir::new().unwrap();
        let orchestrator = orchestrator(&scratch, MockTransformer::new(), BatchConfig::default());
        let source: MemorySource = [("a", b"1".to_vec())].into_iter().collect();
        let mut sink = MemorySink::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = orchestrator
            .run(
                &job(),
                &source,
                &mut sink,
                &AutoConfirm,
                RunContext::new().with_cancel(cancel),
            )
            .await;

        assert_eq!(summary.abort_reason, Some(AbortReason::Cancelled));
        assert!(sink.is_aborted());
        assert!(!sink.is_closed());
        assert!(summary.archive.is_none());
    }

    #[tokio::test]
    async fn test_events_follow_lifecycle() {
        let scratch = TempDir::new().unwrap();
        let transformer = MockTransformer::new().with_error("b", "nope");
        let orchestrator = orchestrator(&scratch, transformer, BatchConfig::default());
        let source: MemorySource = [("a", b"1".to_vec()), ("b", b"2".to_vec())]
            .into_iter()
            .collect();
        let mut sink = MemorySink::new();
        let (tx, mut rx) = mpsc::channel(32);

        orchestrator
            .run(
                &job(),
                &source,
                &mut sink,
                &AutoConfirm,
                RunContext::new().with_progress(tx),
            )
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(events[0], BatchEvent::Confirming { item_count: 2, .. }));
        assert!(matches!(events[1], BatchEvent::Started { total: 2 }));
        assert!(matches!(
            &events[2],
            BatchEvent::ItemFinished { status: ItemStatus::Succeeded, processed: 1, .. }
        ));
        assert!(matches!(
            &events[3],
            BatchEvent::ItemFinished { status: ItemStatus::Failed, processed: 2, .. }
        ));
        assert!(matches!(events[4], BatchEvent::Finalizing));
        assert!(matches!(&events[5], BatchEvent::Finished { summary } if summary.failed == 1));
    }

    #[tokio::test]
    async fn test_dropped_progress_receiver_does_not_stall() {
        let scratch = TempDir::new().unwrap();
        let orchestrator = orchestrator(&scratch, MockTransformer::new(), BatchConfig::default());
        let source: MemorySource = (0..20).map(|i| (format!("f{i}"), vec![1u8])).collect();
        let mut sink = MemorySink::new();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let summary = orchestrator
            .run(
                &job(),
                &source,
                &mut sink,
                &AutoConfirm,
                RunContext::new().with_progress(tx),
            )
            .await;
        assert_eq!(summary.succeeded, 20);
    }
}
