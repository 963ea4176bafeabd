use clap::Args;
use serde::Serialize;
use std::sync::Arc;
use va_market::backend::{InMemoryBackend, WebhookNotifier};
use va_market::error::AppError;
use va_market::marketplace::forms::{ListingForm, ProfileForm, RateInput, SignUpForm};
use va_market::marketplace::{
    JobBoard, MarketplaceError, MarketplaceService, Role, SessionContext, View, ViewRouter,
};

type DemoService = MarketplaceService<InMemoryBackend, InMemoryBackend, WebhookNotifier>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print each job board as JSON instead of a summary.
    #[arg(long)]
    pub(crate) json: bool,
}

struct Persona {
    name: &'static str,
    email: &'static str,
    role: Role,
    time_zone: &'static str,
}

const HIRER: Persona = Persona {
    name: "Hana Hirer",
    email: "hana@example.com",
    role: Role::Hirer,
    time_zone: "EST",
};

const ASSISTANT: Persona = Persona {
    name: "Vera Assist",
    email: "vera@example.com",
    role: Role::VirtualAssistant,
    time_zone: "PST",
};

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let backend = Arc::new(InMemoryBackend::new());
    let context = SessionContext::new(backend.clone(), None);
    let mut router = ViewRouter::new(context.subscribe());
    context.initialize().await;
    let service = MarketplaceService::new(
        backend.clone(),
        backend,
        Arc::new(WebhookNotifier::disabled()),
    );

    println!("Marketplace demo (in-memory backend)");
    println!("- anonymous visit to /jobs -> {:?}", router.resolve_path("/jobs"));

    if !join(&context, &service, &HIRER).await? {
        return Ok(());
    }
    println!("- {} signed in -> /jobs {:?}", HIRER.name, router.resolve(View::Jobs));

    let Some(session) = context.get_session() else {
        println!("  No session after sign-up");
        return Ok(());
    };
    for (title, rate) in [("Inbox triage", 15.0), ("Social Media Help", 10.0)] {
        let form = ListingForm {
            title: Some(title.to_string()),
            description: Some("Ongoing help for a small online shop".to_string()),
            assistant_type: Some("social-media".to_string()),
            hourly_rate: Some(RateInput::Amount(rate)),
            time_zone: Some(HIRER.time_zone.to_string()),
        };
        match service.post_listing(&session, &form).await {
            Ok(posted) => println!("  Posted #{} {}", posted.listing.id, posted.listing.title),
            Err(err) => {
                println!("  Listing rejected: {}", err);
                return Ok(());
            }
        }
    }
    print_board(HIRER.name, service.job_board(&session).await, args.json);

    context.sign_out().await;
    println!("- signed out -> /account {:?}", router.resolve(View::Account));

    if !join(&context, &service, &ASSISTANT).await? {
        return Ok(());
    }
    let Some(session) = context.get_session() else {
        println!("  No session after sign-up");
        return Ok(());
    };
    print_board(ASSISTANT.name, service.job_board(&session).await, args.json);

    let attempt = ListingForm {
        title: Some("Assistants cannot post".to_string()),
        description: Some("Should be refused".to_string()),
        assistant_type: Some("other".to_string()),
        hourly_rate: Some(RateInput::Amount(20.0)),
        time_zone: Some(ASSISTANT.time_zone.to_string()),
    };
    if let Err(err) = service.post_listing(&session, &attempt).await {
        println!("  {} tried to post: {}", ASSISTANT.name, err);
    }

    Ok(())
}

/// Sign up and save a profile. Returns false when a step was refused.
async fn join(
    context: &SessionContext,
    service: &DemoService,
    persona: &Persona,
) -> Result<bool, AppError> {
    let form = SignUpForm {
        full_name: Some(persona.name.to_string()),
        email: Some(persona.email.to_string()),
        password: Some("demo-password".to_string()),
        user_type: Some(persona.role.as_str().to_string()),
    };
    let registration = match form.validate() {
        Ok(registration) => registration,
        Err(errors) => {
            println!("  Sign-up form invalid: {}", errors);
            return Ok(false);
        }
    };
    context.sign_up(&registration).await?;

    let Some(session) = context.get_session() else {
        println!("  {} must confirm their email first", persona.name);
        return Ok(false);
    };
    let profile = ProfileForm {
        full_name: Some(persona.name.to_string()),
        user_type: Some(persona.role.as_str().to_string()),
        time_zone: Some(persona.time_zone.to_string()),
        hourly_rate: None,
        bio: None,
    };
    match service.save_profile(&session, &profile).await {
        Ok(profile) => {
            println!("- {} joined as {}", profile.display_name, profile.role.label());
            Ok(true)
        }
        Err(err) => {
            println!("  Profile not saved: {}", err);
            Ok(false)
        }
    }
}

fn print_board(viewer: &str, board: Result<JobBoard, MarketplaceError>, json: bool) {
    let board = match board {
        Ok(board) => board,
        Err(err) => {
            println!("  Job board unavailable: {}", err);
            return;
        }
    };

    if json {
        print_json(&board);
        return;
    }

    println!("  {} sees \"{}\"", viewer, board.heading);
    if let Some(message) = board.empty_message {
        println!("    {}", message);
    }
    for listing in &board.listings {
        println!(
            "    - {} | ${:.2}/hr | {} | posted {}",
            listing.title,
            listing.hourly_rate,
            listing.time_zone,
            listing.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!(
        "    Post New Job control: {}",
        if board.can_post_listing { "shown" } else { "hidden" }
    );
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(err) => println!("  View payload unavailable: {}", err),
    }
}
