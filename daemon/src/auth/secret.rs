use ring::rand::{SecureRandom, SystemRandom};

const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const CHARS_LEN: usize = CHARS.len();

pub fn generate_secret_string(length: usize) -> Result<String, ring::error::Unspecified> {
    let rng = SystemRandom::new();
    let mut s = String::with_capacity(length);

    for _ in 0..length {
        let idx = uniform_random_index(&rng, CHARS_LEN)?;
        s.push(CHARS[idx] as char);
    }

    Ok(s)
}

fn uniform_random_index(rng: &SystemRandom, max: usize) -> Result<usize, ring::error::Unspecified> {
    let byte_count = ((max as f64).log2() / 8.0).ceil() as usize;
    let mut buf = vec![0u8; byte_count];

    // rejection sampling keeps the distribution uniform
    let limit = (1u64 << (8 * byte_count)) - ((1u64 << (8 * byte_count)) % max as u64);
    loop {
        rng.fill(&mut buf)?;
        let num = buf.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        if num < limit {
            return Ok((num % max as u64) as usize);
        }
    }
}
