use rand::Rng;

pub const OTP_MIN: u32 = 1_000;
pub const OTP_MAX: u32 = 9_999;

/// Four decimal digits drawn uniformly from `OTP_MIN..=OTP_MAX`. Codes are
/// scoped to a single booking, so collisions across bookings are allowed.
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(OTP_MIN..=OTP_MAX).to_string()
}

#[cfg(test)]
mod tests {
    use super::{OTP_MAX, OTP_MIN, generate_otp};

    #[test]
    fn otp_is_four_digits_in_range() {
        for _ in 0..500 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 4);
            let value: u32 = otp.parse().unwrap();
            assert!((OTP_MIN..=OTP_MAX).contains(&value));
        }
    }
}
