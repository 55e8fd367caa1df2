use std::time::Duration;

use sitegate_core::UsageRecorder;

use super::open_evaluator;

pub fn run(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (db, _matcher, evaluator) = open_evaluator()?;

    let check = evaluator.would_exceed_open_limit(url);
    if check.would_exceed {
        println!(
            "Blocked: opening again would exceed the open limit ({}/{})",
            check.current_opens, check.limit
        );
        return Ok(());
    }

    let Some(site_id) = check.site_id.or_else(|| {
        // Sites without an open limit still get their open counted.
        evaluator.evaluate(1, url).site_id
    }) else {
        println!("Not a tracked site; nothing recorded");
        return Ok(());
    };

    let recorder = UsageRecorder::new(db, Duration::from_secs(5));
    recorder.record_open(&site_id);
    println!("Open recorded for {site_id}");

    let result = evaluator.evaluate(1, url);
    if result.should_block {
        println!(
            "Now over budget ({})",
            result.limit_type.map(|l| l.as_token()).unwrap_or("?")
        );
        if let Some(reason) = result.reason {
            println!("  {reason}");
        }
    }
    Ok(())
}
