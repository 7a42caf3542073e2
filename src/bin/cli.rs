use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fs;

const TOKEN_FILE: &str = ".coursehub_token";
const REFRESH_FILE: &str = ".coursehub_refresh";

#[derive(Parser)]
#[command(name = "coursehub-cli")]
#[command(about = "CLI for the CourseHub API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short, long)]
        email: String,
        #[arg(short = 'n', long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Exchange the saved refresh token for a fresh access token
    Refresh,
    Courses,
    Course {
        #[arg(short, long)]
        id: u64,
    },
    CreateCourse {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value_t = 0)]
        price: i64,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    DeleteCourse {
        #[arg(short, long)]
        id: u64,
    },
    Lessons,
    CreateLesson {
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        course: u64,
        #[arg(short, long)]
        video_url: Option<String>,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Toggle the subscription for a course (on, then off again)
    Subscribe {
        #[arg(short, long)]
        course_id: u64,
    },
    /// Start the payment flow for a paid course
    Checkout {
        #[arg(short, long)]
        course_id: u64,
    },
    Payments,
    /// Create (or fetch) the payment-provider customer for this account
    Customer,
    Logout,
}

#[derive(Deserialize)]
struct LoginResponse {
    access: String,
    refresh: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Register { email, username, password } => {
            let res = client.post(format!("{}/register/", cli.url))
                .json(&json!({ "email": email, "username": username, "password": password }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Login { email, password } => {
            let res = client.post(format!("{}/login/", cli.url))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: LoginResponse = res.json().await?;
                // Save both tokens
                fs::write(TOKEN_FILE, body.access)?;
                fs::write(REFRESH_FILE, body.refresh)?;
                println!("Logged in. Tokens saved to {} / {}", TOKEN_FILE, REFRESH_FILE);
            } else {
                println!("Login failed: {}", res.text().await?);
            }
        }
        Commands::Refresh => {
            let refresh = fs::read_to_string(REFRESH_FILE).unwrap_or_default();
            let res = client.post(format!("{}/token/refresh/", cli.url))
                .json(&json!({ "refresh": refresh }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: RefreshResponse = res.json().await?;
                fs::write(TOKEN_FILE, body.access)?;
                println!("Access token refreshed and saved to {}", TOKEN_FILE);
            } else {
                println!("Refresh failed: {}", res.text().await?);
            }
        }
        Commands::Courses => {
            let res = client.get(format!("{}/courses/", cli.url))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Course { id } => {
            let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
            let res = client.get(format!("{}/courses/{}/", cli.url, id))
                .header("Authorization", format!("Bearer {}", token))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::CreateCourse { title, price, description } => {
            let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
            let res = client.post(format!("{}/courses/", cli.url))
                .header("Authorization", format!("Bearer {}", token))
                .json(&json!({ "title": title, "price": price, "description": description }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::DeleteCourse { id } => {
            let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
            let res = client.delete(format!("{}/courses/{}/", cli.url, id))
                .header("Authorization", format!("Bearer {}", token))
                .send()
                .await?;
            println!("Status: {}", res.status());
        }
        Commands::Lessons => {
            let res = client.get(format!("{}/lesson/", cli.url))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::CreateLesson { title, course, video_url, description } => {
            let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
            let res = client.post(format!("{}/lesson/create/", cli.url))
                .header("Authorization", format!("Bearer {}", token))
                .json(&json!({
                    "title": title,
                    "course": course,
                    "video_url": video_url,
                    "description": description
                }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Subscribe { course_id } => {
            let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
            let res = client.post(format!("{}/subscription/", cli.url))
                .header("Authorization", format!("Bearer {}", token))
                .json(&json!({ "course_id": course_id }))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Checkout { course_id } => {
            let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
            let res = client.post(format!("{}/courses/{}/checkout/", cli.url, course_id))
                .header("Authorization", format!("Bearer {}", token))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Payments => {
            let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
            let res = client.get(format!("{}/payment/", cli.url))
                .header("Authorization", format!("Bearer {}", token))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Customer => {
            let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
            let res = client.post(format!("{}/stripe/customer/", cli.url))
                .header("Authorization", format!("Bearer {}", token))
                .send()
                .await?;
            println!("Response: {}", res.text().await?);
        }
        Commands::Logout => {
            let _ = fs::remove_file(TOKEN_FILE);
            let _ = fs::remove_file(REFRESH_FILE);
            println!("Logged out (tokens removed).");
        }
    }

    Ok(())
}
