use pixelforge_core::images::display_url;
use pixelforge_core::{AppState, ModelKind, RequestStatus};
use tokio::sync::watch;

pub fn catalog(state: &AppState) {
    for kind in ModelKind::ALL {
        println!("{kind}:");
        let models = state.catalog.models(kind);
        if models.is_empty() {
            println!("  (none)");
        }
        for model in models {
            println!("  {model}");
        }
    }
    if let Some(error) = &state.models_error {
        eprintln!("{error}");
    }
}

/// Prints the image panel: the error, the images, or the placeholder.
pub fn results(state: &AppState) {
    match state.status() {
        RequestStatus::Failed => {
            eprintln!("Generation Failed");
            if let Some(error) = &state.error {
                eprintln!("{error}");
            }
        }
        RequestStatus::Succeeded => {
            println!("Generated {} image(s):", state.images.len());
            for image in &state.images {
                println!("  [{}] {}", image.id, display_url(&image.url));
            }
        }
        _ => {
            println!("No images generated yet");
            println!("Select a checkpoint and generate your first image!");
        }
    }
}

/// Reports status transitions on stderr until the controller goes away.
pub async fn progress(mut updates: watch::Receiver<AppState>) {
    let mut last = None;
    loop {
        let status = updates.borrow_and_update().status();
        if last != Some(status) {
            match status {
                RequestStatus::LoadingModels => eprintln!("Loading models..."),
                RequestStatus::Generating => eprintln!("Generating your masterpiece..."),
                _ => {}
            }
            last = Some(status);
        }
        if updates.changed().await.is_err() {
            break;
        }
    }
}
