use spotify_web_api::{Client, SpotifyApiError};

#[tokio::main]
pub async fn main() -> Result<(), SpotifyApiError> {
    let client = Client::new("access_token");

    match client.currently_playing().await? {
        Some(playing) => println!("{:?}", playing.item),
        None => println!("nothing playing"),
    }
    Ok(())
}
