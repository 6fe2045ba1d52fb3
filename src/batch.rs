use crate::config::Config;
use crate::error::CutError;
use crate::output::{render_overlay, OutputWriter};
use crate::rasterizer::Rasterizer;
use crate::report::{BatchReport, FileReport, PageOutcome, PageReport, PageSummary};
use crate::segmentation::PagePipeline;
use crate::source::{self, InputFile, PageSource};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;

struct PageJob {
    file_index: usize,
    page_index: usize,
    input: Arc<InputFile>,
    source: Arc<PageSource>,
}

/// Work produced by opening one input file
enum Task {
    OpenFailed { file_index: usize, error: String },
    Page(PageJob),
}

enum Event {
    FileFailed { file_index: usize, error: String },
    Page { file_index: usize, report: PageReport },
}

/// Segment every supported file in the input directory.
///
/// Files are opened lazily and each one expands straight into its page jobs,
/// so only files with pending pages are held in memory. Opening and page
/// processing run on blocking workers, at most `config.jobs` at a time. A
/// failing file or page is recorded in the report and never stops its
/// siblings.
pub async fn run(
    config: Arc<Config>,
    rasterizer: Arc<dyn Rasterizer>,
) -> Result<BatchReport, CutError> {
    let start = Instant::now();

    let inputs = source::discover_inputs(&config.input)?;
    if inputs.is_empty() {
        return Err(CutError::NoInput(config.input.clone()));
    }

    let writer = Arc::new(OutputWriter::new(
        config.output.clone(),
        config.debug_dir.clone(),
        config.jpeg_quality,
    ));
    writer.prepare()?;
    let pipeline = Arc::new(PagePipeline::new(config.layout.clone()));

    tracing::info!(
        files = inputs.len(),
        jobs = config.jobs,
        input = %config.input.display(),
        "Starting batch"
    );

    let mut files: Vec<FileReport> = inputs
        .iter()
        .map(|input| FileReport {
            file: file_label(input),
            error: None,
            pages: Vec::new(),
        })
        .collect();

    let scale = config.pdf_scale;
    let events: Vec<Event> = stream::iter(inputs.into_iter().map(Arc::new).enumerate())
        .map(|(file_index, input)| {
            let rasterizer = Arc::clone(&rasterizer);
            async move {
                let path = input.path.clone();
                let result = tokio::task::spawn_blocking(move || {
                    PageSource::open(&path, rasterizer.as_ref())
                })
                .await
                .unwrap_or_else(|e| Err(CutError::Internal(format!("worker failed: {}", e))));
                (file_index, input, result)
            }
        })
        .buffer_unordered(config.jobs)
        .flat_map(|(file_index, input, result)| stream::iter(page_tasks(file_index, input, result)))
        .map(|task| {
            let pipeline = Arc::clone(&pipeline);
            let writer = Arc::clone(&writer);
            async move {
                match task {
                    Task::OpenFailed { file_index, error } => Event::FileFailed { file_index, error },
                    Task::Page(job) => Event::Page {
                        file_index: job.file_index,
                        report: run_page(job, pipeline, writer, scale).await,
                    },
                }
            }
        })
        .buffer_unordered(config.jobs)
        .collect()
        .await;

    for event in events {
        match event {
            Event::FileFailed { file_index, error } => files[file_index].error = Some(error),
            Event::Page { file_index, report } => files[file_index].pages.push(report),
        }
    }
    for file in &mut files {
        file.pages.sort_by_key(|p| p.page);
    }

    let report = BatchReport::new(
        config.input.clone(),
        config.output.clone(),
        files,
        start.elapsed().as_millis() as u64,
    );

    tracing::info!(
        files = report.files.len(),
        files_failed = report.files_failed,
        pages = report.pages_processed,
        pages_failed = report.pages_failed,
        questions = report.questions,
        elapsed_ms = report.elapsed_ms,
        "Batch complete"
    );

    Ok(report)
}

fn page_tasks(
    file_index: usize,
    input: Arc<InputFile>,
    result: Result<PageSource, CutError>,
) -> Vec<Task> {
    match result {
        Ok(source) => {
            let source = Arc::new(source);
            tracing::debug!(
                file = %file_label(&input),
                pages = source.page_count(),
                "Opened input"
            );
            (0..source.page_count())
                .map(|page_index| {
                    Task::Page(PageJob {
                        file_index,
                        page_index,
                        input: Arc::clone(&input),
                        source: Arc::clone(&source),
                    })
                })
                .collect()
        }
        Err(e) => {
            tracing::error!(file = %file_label(&input), error = %e, "Failed to open input");
            vec![Task::OpenFailed {
                file_index,
                error: e.to_string(),
            }]
        }
    }
}

async fn run_page(
    job: PageJob,
    pipeline: Arc<PagePipeline>,
    writer: Arc<OutputWriter>,
    scale: f32,
) -> PageReport {
    let page_index = job.page_index;
    let label = file_label(&job.input);

    let outcome = match tokio::task::spawn_blocking(move || {
        let _span = tracing::info_span!(
            "page",
            file = %job.input.base_name,
            page = job.page_index + 1
        )
        .entered();
        process_page(
            &job.source,
            &job.input.base_name,
            job.page_index,
            &pipeline,
            &writer,
            scale,
        )
    })
    .await
    {
        Ok(Ok(summary)) => PageOutcome::Segmented(summary),
        Ok(Err(e)) => {
            tracing::error!(file = %label, page = page_index + 1, error = %e, "Page failed");
            PageOutcome::Failed {
                error: e.to_string(),
            }
        }
        Err(e) => {
            tracing::error!(file = %label, page = page_index + 1, error = %e, "Page worker crashed");
            PageOutcome::Failed {
                error: format!("worker failed: {}", e),
            }
        }
    };

    PageReport {
        page: page_index + 1,
        outcome,
    }
}

/// Segment one page and write its crops and debug overlay
pub fn process_page(
    source: &PageSource,
    base: &str,
    page_index: usize,
    pipeline: &PagePipeline,
    writer: &OutputWriter,
    scale: f32,
) -> Result<PageSummary, CutError> {
    let image = source.page(page_index, scale)?;
    let segmentation = pipeline.process(page_index, &image)?;

    let overlay = render_overlay(&image, &segmentation.anchor, &segmentation.regions);
    writer.write_debug(base, page_index, &overlay)?;
    let written = writer.write_crops(base, &segmentation)?;

    for column in &segmentation.columns {
        if column.crops.is_empty() {
            tracing::info!(column = column.region.index + 1, "Column produced no questions");
        }
    }
    tracing::debug!(crops = written.len(), "Page written");

    Ok(PageSummary::new(&segmentation, Some(base)))
}

fn file_label(input: &InputFile) -> String {
    input
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| input.base_name.clone())
}
