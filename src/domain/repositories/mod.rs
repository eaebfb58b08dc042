pub mod price_oracle;
