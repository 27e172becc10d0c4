use clap::Parser;
use course_enroll::utils::error::ErrorSeverity;
use course_enroll::utils::{logger, validation::Validate};
use course_enroll::{
    enroll_batch, CatalogConfig, CliConfig, EnrollmentReport, EnrollmentService, MemoryStore,
    OfferingId,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliConfig::parse();

    logger::init_logger(args.log_format(), args.verbose)?;

    tracing::info!("📁 Loading catalog from: {}", args.config);
    let mut catalog = match CatalogConfig::from_file(&args.config) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("❌ Failed to load catalog '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if let Some(concurrency) = args.concurrency {
        catalog.engine.batch_concurrency = concurrency;
        tracing::info!("🔧 Concurrency overridden to: {}", concurrency);
    }

    if let Err(e) = catalog.validate() {
        tracing::error!("❌ Catalog validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    let requests = catalog.requests();
    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No enrollments will be made");
        println!(
            "Catalog: {} offerings, {} existing enrollments",
            catalog.offerings.len(),
            catalog.enrollments.len()
        );
        for request in &requests {
            println!(
                "  would enroll {} -> {}",
                request.student_id, request.offering_id
            );
        }
        return Ok(());
    }

    let store = MemoryStore::from_catalog(&catalog)?;
    let concurrency = catalog.engine.batch_concurrency;
    let service = Arc::new(EnrollmentService::new(store, catalog.engine.clone()));

    let report = enroll_batch(Arc::clone(&service), requests, concurrency).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
        for offering in &catalog.offerings {
            let roster = service
                .roster(&OfferingId::new(offering.id.clone()))
                .await?;
            println!(
                "  {:<16} {:>3}/{:<3}",
                offering.id,
                roster.len(),
                offering.capacity
            );
        }
    }

    // 依最嚴重的錯誤決定退出碼
    let exit_code = match report.worst_severity() {
        None | Some(ErrorSeverity::Low) => 0,
        Some(ErrorSeverity::Medium) | Some(ErrorSeverity::High) => 1,
        Some(ErrorSeverity::Critical) => 3,
    };
    if exit_code > 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}

fn print_report(report: &EnrollmentReport) {
    println!("✅ Enrolled {}/{} requests", report.enrolled, report.total);
    for outcome in &report.outcomes {
        match (&outcome.enrollment_id, &outcome.message) {
            (Some(id), _) => println!(
                "  ✔ {} -> {} (#{})",
                outcome.student_id, outcome.offering_id, id
            ),
            (None, Some(message)) => println!(
                "  ✘ {} -> {}: {}",
                outcome.student_id, outcome.offering_id, message
            ),
            (None, None) => {}
        }
    }
    for (kind, count) in &report.rejected {
        println!("  {}: {}", kind, count);
    }
    println!("Rosters:");
}
